//! # braid-timeline
//!
//! Pure projection of canonical session events into a display-ready
//! timeline: tool calls paired with their results across message
//! boundaries, streamed chunks consolidated into finished text, runs of
//! scratchpad tool calls collapsed into think groups.
//!
//! Everything here is read-only and allocates fresh outputs — no caching,
//! no locks, no I/O. The [`TimelineEvent`] union is a wire-stable contract
//! for rendering layers.

#![deny(unsafe_code)]

pub mod project;
pub mod types;

pub use project::{
    ProjectorOptions, consolidate_chunks, flatten, flatten_messages, group_think_blocks,
    is_final_assistant_text, pair_tool_events, project,
};
pub use types::{
    ChunkEvent, TextEvent, ThinkGroupEvent, TimelineEvent, ToolCallEvent, ToolInteractionEvent,
    ToolResultEvent,
};
