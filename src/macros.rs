/// Generates a non-exhaustive enum mapping Rust variants to wire-format strings.
///
/// Produces: enum definition + `as_str()` + `Display` + `AsRef<str>` + `FromStr`.
/// The error type is a tuple struct over the rejected string and must be
/// defined separately (see `ParseAmiHeaderError`).
///
/// AMI header names are case-insensitive on the server side, so `FromStr`
/// matches ignoring ASCII case while `as_str()` yields the canonical spelling.
///
/// # Example
///
/// ```ignore
/// define_header_enum! {
///     error_type: ParseMyHeaderError,
///     /// Doc comment for the enum.
///     pub enum MyHeader {
///         ActionId => "ActionID",
///         Channel => "Channel",
///     }
/// }
/// ```
macro_rules! define_header_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[ $( $Name::$variant, )+ ];

            /// Canonical wire spelling.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| {
                        v.as_str()
                            .eq_ignore_ascii_case(s)
                    })
                    .ok_or_else(|| $Err(s.to_string()))
            }
        }
    };
}
