// Core modules: grid/record codecs, key normalization, filters, ranges, errors.
pub mod encode;
pub mod error;
pub mod filter;
pub mod grid;
pub mod keys;
pub mod range;
