//! pagesmith: turn a task brief into a hosted single-page app.
//!
//! A request names a task lineage (`task` + `nonce`) and a round:
//! - Round 1 generates the app, creates a repository and enables Pages
//! - Round 2 regenerates it from a revised brief and republishes
//!
//! Each round commits `index.html`, `README.md`, `LICENSE` and any
//! attachments, then optionally reports the result to a callback URL.

pub mod artifact;
pub mod attachments;
pub mod config;
pub mod error;
pub mod llm;
pub mod naming;
pub mod notify;
pub mod orchestrator;
pub mod publisher;
pub mod retry;
pub mod synth;
pub mod types;
pub mod web;
