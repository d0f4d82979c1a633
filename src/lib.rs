//! # repo-chat
//!
//! Chat with a GitHub repository. A repository is fetched through the
//! GitHub API, filtered by directory and extension, chunked, embedded into
//! an in-memory vector index, and queried by a retrieval-augmented chat
//! engine that cites the files, authors, and scores it drew on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌─────────────┐   ┌───────────┐
//! │ locator  │──▶│  fetch  │──▶│ index       │──▶│   chat    │
//! │ + filter │   │ GitHub  │   │ chunk+embed │   │ retrieve  │
//! └──────────┘   └─────────┘   └─────────────┘   │ + prompt  │
//!                                                └─────┬─────┘
//!                      ┌───────────────────────────────┤
//!                      ▼                               ▼
//!                 ┌──────────┐                   ┌──────────┐
//!                 │   REPL   │                   │   HTTP   │
//!                 │  (chat)  │                   │ (serve)  │
//!                 └──────────┘                   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed failures surfaced to users |
//! | [`locator`] | Repository URL parsing |
//! | [`filter`] | Directory and extension include/exclude rules |
//! | [`fetch`] | Repository fetching over the GitHub API |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`llm`] | Chat-completion model abstraction |
//! | [`chat`] | Retrieval-augmented question answering |
//! | [`attribution`] | Citation formatting |
//! | [`conversation`] | Conversation transcript |
//! | [`session`] | Per-session state and commands |
//! | [`repl`] | Terminal front end |
//! | [`server`] | HTTP front end |

pub mod attribution;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod index;
pub mod llm;
pub mod locator;
pub mod models;
pub mod repl;
pub mod server;
pub mod session;
