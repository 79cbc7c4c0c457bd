//! Datacenter identifiers
//!
//! A [`DcId`] is either an exact datacenter (internal, or external for
//! content-delivery endpoints), the logical main datacenter, or empty.
//! Main is resolved by the dispatcher at routing time and never used as a
//! table index.

use std::fmt;
use crate::constants::MAX_DC_COUNT;

/// Datacenter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DcId {
    /// No datacenter
    #[default]
    Empty,
    /// Whichever datacenter is main when the query is routed
    Main,
    /// Regular backend datacenter
    Internal(i32),
    /// Content-delivery datacenter
    External(i32),
}

impl DcId {
    /// Whether `raw_id` fits the datacenter table
    pub fn is_valid(raw_id: i32) -> bool {
        raw_id >= 1 && raw_id as usize <= MAX_DC_COUNT
    }

    /// Internal datacenter with the given raw id
    pub fn internal(raw_id: i32) -> Self {
        DcId::Internal(raw_id)
    }

    /// External (content-delivery) datacenter with the given raw id
    pub fn external(raw_id: i32) -> Self {
        DcId::External(raw_id)
    }

    /// The logical main datacenter
    pub fn main() -> Self {
        DcId::Main
    }

    /// True for [`DcId::Main`]
    pub fn is_main(&self) -> bool {
        matches!(self, DcId::Main)
    }

    /// True for ids naming one concrete datacenter
    pub fn is_exact(&self) -> bool {
        matches!(self, DcId::Internal(_) | DcId::External(_))
    }

    /// True for regular backend datacenters
    pub fn is_internal(&self) -> bool {
        matches!(self, DcId::Internal(_))
    }

    /// True for content-delivery datacenters
    pub fn is_external(&self) -> bool {
        matches!(self, DcId::External(_))
    }

    /// Raw numeric id of an exact datacenter
    pub fn raw_id(&self) -> Option<i32> {
        match *self {
            DcId::Internal(id) | DcId::External(id) => Some(id),
            DcId::Main | DcId::Empty => None,
        }
    }
}

impl fmt::Display for DcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DcId::Empty => write!(f, "DcId{{empty}}"),
            DcId::Main => write!(f, "DcId{{main}}"),
            DcId::Internal(id) => write!(f, "DcId{{{}}}", id),
            DcId::External(id) => write!(f, "DcId{{{} cdn}}", id),
        }
    }
}
