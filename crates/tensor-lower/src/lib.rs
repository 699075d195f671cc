//! Lowering of frontend tensor graphs into the explicit core vocabulary.
//!
//! A [`spec::Function`] holds SSA instructions from both vocabularies. The `lowering` module
//! registers one pattern per frontend kind allowed by a [`conversion::LegalitySet`];
//! [`driver::apply_partial_conversion`] applies them and reports what was left behind.

pub mod conversion;
pub mod driver;
pub mod index;
pub mod ir_utils;
pub mod lowering;
pub mod passes;
pub mod pattern;
pub mod rewriter;
pub mod spec;
