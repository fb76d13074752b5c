//! Supabase gateway
//!
//! Rows go through PostgREST, images through Storage, and change events arrive over
//! the Realtime websocket (Phoenix channels, one socket per subscription).

pub mod client;
pub mod config;
pub mod realtime;

pub use client::SupabaseClient;
pub use config::SupabaseConfig;
