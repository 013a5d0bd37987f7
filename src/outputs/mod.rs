//! Files written by the service.
//!
//! Everything structured goes to the database ([`crate::store`]); the only
//! artifacts on disk are generated images.
//!
//! # Output Structure
//!
//! ```text
//! uploads_dir/                       # served by the dashboard as /uploads
//! ├── news_1733616000123.jpg         # from `run`
//! └── news_backfill_42_1733619600456.jpg
//! ```

pub mod images;

pub use images::ImageStore;
