//! `std_srvs` equivalents.

use serde::{Deserialize, Serialize};

/// Request of the argument-less `Empty` service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyRequest;

/// Response of the `Empty` service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResponse;
