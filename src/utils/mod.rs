//! Commonly used utilities.

pub mod hash;
pub mod string;

pub mod prelude {
    pub use super::hash::FastHashMap;
    pub use super::string::starts_with_ignore_case;
}
