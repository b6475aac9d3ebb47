//! Identity types for the builder databases.
//!
//! Functions and data sources are tagged with a stable ordinal in discovery
//! order. Each id is a newtype over `u32` that indexes directly into its
//! database's storage vector.

use std::fmt;

macro_rules! ordinal_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

ordinal_id!(
    /// Ordinal of a function in the Functions database.
    FunctionId
);

ordinal_id!(
    /// Ordinal of a data source in the Data database.
    DataSourceId
);
