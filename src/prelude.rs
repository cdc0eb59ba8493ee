pub use anyhow::{anyhow, bail, Context, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::broadcast;

pub use crate::channels::Channels;
pub use crate::config::{self, Config};
pub use crate::error::{ConnectionFault, DecodeError, MalformedEntry, Rejection};
pub use crate::protocol::Reading;
pub use crate::registry::{MeterSpec, Registry, Unit};
pub use crate::stats::IngestStats;
pub use crate::store::{PowerSample, Store};
pub use crate::{file_error, file_error_with_source};
