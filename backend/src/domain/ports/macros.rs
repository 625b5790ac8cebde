//! `define_port_error!` declares a port's error enum in one place.
//!
//! Each variant gets a `thiserror` message, a snake_case constructor whose
//! arguments take `impl Into<T>`, and an `is_<variant>` predicate. Adapters
//! build errors through the constructors, and callers branch on the
//! predicates instead of matching on fields they do not need.

macro_rules! define_port_error {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@constructor $variant [] [] $( $($field : $ty,)* )?);

                ::paste::paste! {
                    pub fn [<is_ $variant:snake>](&self) -> bool {
                        matches!(self, Self::$variant { .. })
                    }
                }
            )*
        }
    };

    // Unit variant: nothing was collected.
    (@constructor $variant:ident [] []) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    // All fields consumed.
    (@constructor $variant:ident [$($params:tt)+] [$($inits:tt)+]) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)+) -> Self {
                Self::$variant { $($inits)+ }
            }
        }
    };

    (@constructor $variant:ident [$($params:tt)*] [$($inits:tt)*] $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @constructor $variant
            [$($params)* $field: impl Into<$ty>,]
            [$($inits)* $field: $field.into(),]
            $($rest)*
        );
    };
}

pub(crate) use define_port_error;
