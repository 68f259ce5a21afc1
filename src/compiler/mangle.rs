//! Names for specialized clones.
//!
//! The name of a clone doubles as its registry key: two requests producing the
//! same name share one clone. Names therefore have to be deterministic and
//! distinct for distinct `(callee, indices)` pairs.
//!
//! ```text
//! $es <len(callee)> <callee> g <index>_ <index>_ ...
//!
//! render, [0]     -> $es6renderg0_
//! draw, [1, 2]    -> $es4drawg1_2_
//! draw, [12]      -> $es4drawg12_
//! ```

use std::fmt::Write;

/// Produces specialization name tokens.
pub trait NameMangler: Send + Sync {
    /// Returns the name of the clone of `callee` specialized at `indices`.
    ///
    /// `indices` is expected in ascending order.
    fn specialization_name(&self, callee: &str, indices: &[usize]) -> String;
}

/// Default length-prefixed mangling scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecializationMangler;

impl SpecializationMangler {
    /// Prefix shared by every existential specialization.
    pub const PREFIX: &'static str = "$es";

    /// Returns `true` if `name` was produced by this mangler.
    #[must_use]
    pub fn is_specialization(name: &str) -> bool {
        name.starts_with(Self::PREFIX)
    }
}

impl NameMangler for SpecializationMangler {
    fn specialization_name(&self, callee: &str, indices: &[usize]) -> String {
        let mut name = String::with_capacity(Self::PREFIX.len() + callee.len() + 8);
        name.push_str(Self::PREFIX);
        // Writing into a String cannot fail
        let _ = write!(name, "{}{}g", callee.len(), callee);
        for index in indices {
            let _ = write!(name, "{index}_");
        }
        name
    }
}
