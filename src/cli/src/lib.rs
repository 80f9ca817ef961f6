//! tedge-oscar CLI - manage thin-edge.io flow images and instances.

pub mod commands;
pub mod output;
