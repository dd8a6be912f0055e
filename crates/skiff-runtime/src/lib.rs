// SPDX-License-Identifier: MIT
//
// Skiff Runtime — the embedded script engine abstraction and the serialized
// execution queue that mediates every engine invocation.  The engine carries
// process-wide state (environment, output buffer) between invocations, so it
// is never called from more than one place at a time.

pub mod engine;
pub mod process;
pub mod queue;

pub use engine::{normalize_capture, Invocation, ScriptEngine};
pub use process::ProcessEngine;
pub use queue::ExecutionQueue;
