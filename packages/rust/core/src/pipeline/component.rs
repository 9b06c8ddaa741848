//! The component contract.

use ragpipe_shared::Result;

use super::value::{SocketSpec, SocketValues};

/// A named unit of work in a pipeline.
///
/// The socket contract is static: `inputs` and `outputs` must return the
/// same descriptors every time they are called. `run` is invoked at most
/// once per pipeline run, with every connected or supplied input present
/// and optional inputs filled with their defaults.
pub trait Component: Send + Sync {
    fn inputs(&self) -> Vec<SocketSpec>;

    fn outputs(&self) -> Vec<SocketSpec>;

    fn run(&self, inputs: SocketValues) -> Result<SocketValues>;
}
