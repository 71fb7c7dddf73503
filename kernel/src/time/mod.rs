// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod tick;
pub mod timeout;

// Re-export.
pub use tick::*;
pub use timeout::*;
