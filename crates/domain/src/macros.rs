//! Macro for implementing Display and FromStr for wire-name enums
//!
//! Enums that travel over the wire as fixed strings (HTTP methods, log
//! formats) share one implementation of both traits. Parsing is
//! case-insensitive; output always uses the declared spelling.
//!
//! # Example
//!
//! ```rust
//! use bizberry_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Verb {
//!     Get,
//!     Post,
//! }
//!
//! impl_wire_name_conversions!(Verb {
//!     Get => "GET",
//!     Post => "POST",
//! });
//!
//! assert_eq!(Verb::Get.to_string(), "GET");
//! assert_eq!("post".parse::<Verb>(), Ok(Verb::Post));
//! ```

/// Implements `Display`, `FromStr` and an `as_str` accessor for wire-name
/// enums.
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Wire spelling of this variant.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestFormat {
        Pretty,
        Json,
    }

    impl_wire_name_conversions!(TestFormat {
        Pretty => "pretty",
        Json => "json",
    });

    #[test]
    fn test_display_uses_declared_spelling() {
        assert_eq!(TestFormat::Pretty.to_string(), "pretty");
        assert_eq!(TestFormat::Json.as_str(), "json");
    }

    #[test]
    fn test_fromstr_is_case_insensitive() {
        assert_eq!(TestFormat::from_str("JSON").unwrap(), TestFormat::Json);
        assert_eq!(TestFormat::from_str("Pretty").unwrap(), TestFormat::Pretty);
    }

    #[test]
    fn test_fromstr_invalid() {
        let err = TestFormat::from_str("yaml").unwrap_err();
        assert!(err.contains("Invalid TestFormat"));
        assert!(err.contains("yaml"));
    }
}
