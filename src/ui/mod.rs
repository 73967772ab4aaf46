// UI module - the rendering-layer boundary
//
// This module contains:
// - Renderer: the capability trait a rendering layer implements
// - RenderBridge: pumps state snapshots to a Renderer and routes failures of spawned work to it
// - ConsoleRenderer: line-based renderer used by the binary

pub mod bridge;
pub mod console;
pub mod renderer;

pub use bridge::RenderBridge;
pub use console::ConsoleRenderer;
#[cfg(test)]
pub use renderer::MockRenderer;
pub use renderer::Renderer;
