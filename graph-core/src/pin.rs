//! Pins: named endpoints on a node definition.

use serde::{Deserialize, Serialize};

/// Whether a pin is an input or output of its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDirection {
    In,
    Out,
}

/// Whether a pin carries sequencing (`flow`) or a value (`data`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinSignal {
    Flow,
    Data,
}

/// Routing strategy an output flow pin's transitions take by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionStrategy {
    Sequential,
    Parallel,
}

impl Default for TransitionStrategy {
    fn default() -> Self {
        TransitionStrategy::Sequential
    }
}

/// A named endpoint on a node definition.
///
/// Output pins may declare a default routing `strategy`; input pins never
/// carry one (it would have no meaning — strategy governs how a node's own
/// transitions on an *output* pin fan out).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinDescriptor {
    pub id: String,
    pub direction: PinDirection,
    pub signal: PinSignal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<TransitionStrategy>,
}

impl PinDescriptor {
    pub fn flow_in(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PinDirection::In,
            signal: PinSignal::Flow,
            strategy: None,
        }
    }

    pub fn flow_out(id: impl Into<String>, strategy: TransitionStrategy) -> Self {
        Self {
            id: id.into(),
            direction: PinDirection::Out,
            signal: PinSignal::Flow,
            strategy: Some(strategy),
        }
    }

    pub fn data_in(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PinDirection::In,
            signal: PinSignal::Data,
            strategy: None,
        }
    }

    pub fn data_out(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PinDirection::Out,
            signal: PinSignal::Data,
            strategy: None,
        }
    }
}
