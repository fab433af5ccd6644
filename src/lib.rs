//! # SmartPics
//!
//! AI-assisted alt text, captions and titles for image attachments.
//!
//! SmartPics looks at the post an image belongs to, works out what that post
//! is about, and asks a vision model to describe the image in that context.
//! Results are cached under the image fingerprint so a repeated or
//! near-identical upload never costs a second provider call.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌────────────────┐
//!  attachment ───▶ │ ImageProcessor │───▶ alt text / caption / title
//!                  └───┬───────┬────┘
//!                      │       │ miss
//!               lookup │       ▼
//!            ┌─────────▼──┐  ┌──────────────┐   ┌────────────┐
//!            │ Similarity │  │ TextAnalyzer │──▶│ AiProvider │
//!            │   Cache    │  │  + SEO chain │   └────────────┘
//!            └─────┬──────┘  └──────┬───────┘
//!                  ▼                ▼
//!            ┌─────────────────────────────┐
//!            │           SQLite            │
//!            └─────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! smartpics init                 # create database
//! smartpics analyze 42           # topics, keywords, sentiment, readability
//! smartpics process 101          # describe one image
//! smartpics bulk --limit 20      # describe images missing alt text
//! smartpics cache optimize       # evict stale entries, rebuild clusters
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | HTML stripping, headings, excerpts |
//! | [`analyzer`] | Topics, keywords, sentiment and readability |
//! | [`cache`] | Similarity cache and eviction policies |
//! | [`processor`] | Per-image workflow and bulk runs |
//! | [`traits`] | Collaborator seams |
//! | [`store`] | Storage traits and in-memory stores |
//! | [`sqlite_store`] | SQLite-backed stores |
//! | [`provider`] | AI vision providers |
//! | [`similarity`] | Image fingerprinting and ranking |
//! | [`seo`] | Focus-keyword lookup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyzer;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod migrate;
pub mod models;
pub mod processor;
pub mod provider;
pub mod seo;
pub mod similarity;
pub mod sqlite_store;
pub mod store;
pub mod traits;
