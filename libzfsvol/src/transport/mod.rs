//! Plugin protocol transport.
//!
//! [`PluginServer`] serves a driver over HTTP on a [`PluginListener`];
//! [`PluginClient`] issues calls against a plugin's Unix socket.

pub mod client;
pub mod listener;
pub mod server;

pub use client::PluginClient;
pub use listener::{HandedOver, PluginListener};
pub use server::{PluginServer, dispatch, router};
