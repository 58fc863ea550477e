pub mod config;
pub mod db;
pub mod differ;
pub mod engine;
pub mod migrate;
pub mod pages;
pub mod redirects;
pub mod report;
pub mod runtime;
pub mod sites;
pub mod slugs;
pub mod walker;
