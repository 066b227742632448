pub mod mock;
mod pump;
pub mod stream;

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

pub use pump::{pump_response, PumpOutcome};
pub use stream::StreamParser;

pub type ByteStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>;
