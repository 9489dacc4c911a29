//! Responsive image variants.

pub mod breakpoints;
pub mod sniff;
pub mod srcset;
pub mod variants;

pub use breakpoints::{BreakpointSpec, Quality, VariantLimits, default_breakpoints};
pub use variants::{Variant, VariantError, generate_variants, generate_variants_blocking};
