//! The built-in handler table.

use crate::format::{FormatKind, FormatName};
use crate::handler::{CodecHandler, CodecHandlerBuilder};
use crate::registry::RegistryConfig;

mod archive;
mod compress;
mod pack200;

/// Compressors first, then archives; within each group the order is the
/// detection priority.
pub(crate) fn builtin_handlers(config: &RegistryConfig) -> Vec<CodecHandler> {
    let mut handlers = compress::handlers(config);
    handlers.extend(archive::handlers(config));
    handlers
}

fn compressor(name: FormatName, config: &RegistryConfig) -> CodecHandlerBuilder {
    CodecHandler::builder(name, FormatKind::Compressor).probe_timeout(config.probe_timeout)
}

fn archive_handler(name: FormatName, config: &RegistryConfig) -> CodecHandlerBuilder {
    CodecHandler::builder(name, FormatKind::Archive).probe_timeout(config.probe_timeout)
}
