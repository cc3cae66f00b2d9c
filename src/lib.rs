//! # encyclo - Streaming Definition Reader
//!
//! `encyclo` looks up encyclopedia-style definitions of a topic and streams
//! them to the terminal as they are generated. Several text-generation
//! providers are supported; Wikipedia is used when none of them can serve
//! the request.
//!
//! ## Features
//!
//! - **Streaming definitions**: Text appears as the provider produces it
//! - **Multiple providers**: DeepSeek, Gemini, Groq, Xunfei Spark and YouChat
//! - **Fallback routing**: Keyless providers and Wikipedia when no key is stored
//! - **Caching**: Topics already looked up in a session are served instantly
//! - **Interactive mode**: Look up one topic after another with `encyclo read`
//!
//! ## Quick Start
//!
//! ```bash
//! # Define a topic
//! encyclo "black hole"
//!
//! # In Chinese, narrowed to a category
//! encyclo --lang zh --category 物理 黑洞
//!
//! # Store a key and select the provider
//! encyclo keys set deepseek
//! encyclo providers select deepseek
//!
//! # Interactive reader
//! encyclo read
//! ```
//!
//! ## Configuration
//!
//! Settings are stored in `~/.config/encyclo/config.toml`:
//!
//! ```toml
//! [encyclo]
//! language = "en"
//! fallback = "fall-through"
//!
//! [providers.groq]
//! model = "llama-3.3-70b-versatile"
//! max_tokens = 800
//!
//! [wiki]
//! timeout_secs = 10
//! ```

/// In-memory cache of completed definitions.
pub mod cache;

/// Command-line interface definitions and handlers.
pub mod cli;

/// Configuration file management and backend overrides.
pub mod config;

/// Persisted API keys and provider selection.
pub mod credentials;

/// Lookup requests, prompts, languages and fragment streams.
pub mod definition;

/// Provider routing and fallback.
pub mod dispatcher;

/// Context reading from files and stdin.
pub mod input;

/// Lookup lifecycle: caching, cancellation and events.
pub mod orchestrator;

/// Global output configuration (quiet mode, colors, stderr/stdout routing).
pub mod output;

/// XDG-style path utilities for configuration and settings storage.
pub mod paths;

/// Streaming backends for each provider.
pub mod providers;

/// Interactive reader session.
pub mod reader;

/// Terminal UI components (spinner, colors, prompts).
pub mod ui;
