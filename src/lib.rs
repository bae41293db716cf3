//! Per-request HMAC token signing and remotely rotated TLS certificate pinning for
//! authenticator SDK clients.
//!
//! The crate is organised leaves first: [`token`] builds the compact signed token,
//! [`store`] keeps the pinned certificate set, [`fetch`] downloads and verifies rotated
//! pins, [`refresh`] rate-limits and single-flights refreshes, and [`pipeline`] ties it all
//! to an outbound reqwest client. [`Authenticator`] is the handle that wires them together.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

// Log events compile away when the `tracing` feature is disabled; the arguments are still
// type-checked so call sites do not drift.
macro_rules! trace_event {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		{
			tracing::$level!($($arg)+);
		}
		#[cfg(not(feature = "tracing"))]
		{
			if false {
				let _ = format!($($arg)+);
			}
		}
	}};
}

pub mod authenticator;
pub mod clock;
pub mod config;
pub mod error;
pub mod ext;
pub mod fetch;
pub mod http;
pub mod obs;
pub mod pin;
pub mod pipeline;
pub mod refresh;
pub mod store;
pub mod tls;
pub mod token;

pub use authenticator::Authenticator;

mod _prelude {
	pub use std::{
		collections::BTreeSet,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
