//! Member owner resolution
//!
//! A field or method reference names the type it was compiled against, which
//! need not be the type that declares the member. The rewriter asks an
//! [`OwnerResolver`] for the declaring type before it looks up definitions.

use std::borrow::Cow;

/// Finds the type that declares a referenced member
pub trait OwnerResolver: Send + Sync {
    /// Declaring type of field `name:descriptor` referenced through `owner`
    fn resolve_field_owner<'a>(&self, owner: &'a str, name: &str, descriptor: &str) -> Cow<'a, str>;

    /// Declaring type of method `name descriptor` referenced through `owner`
    fn resolve_method_owner<'a>(
        &self,
        owner: &'a str,
        name: &str,
        descriptor: &str,
    ) -> Cow<'a, str>;
}

/// Resolver that trusts the referenced owner
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl OwnerResolver for IdentityResolver {
    fn resolve_field_owner<'a>(&self, owner: &'a str, _name: &str, _descriptor: &str) -> Cow<'a, str> {
        Cow::Borrowed(owner)
    }

    fn resolve_method_owner<'a>(
        &self,
        owner: &'a str,
        _name: &str,
        _descriptor: &str,
    ) -> Cow<'a, str> {
        Cow::Borrowed(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ParentResolver;

    impl OwnerResolver for ParentResolver {
        fn resolve_field_owner<'a>(&self, owner: &'a str, name: &str, _: &str) -> Cow<'a, str> {
            if owner == "a/Child" && name == "inherited" {
                Cow::Owned("a/Parent".to_string())
            } else {
                Cow::Borrowed(owner)
            }
        }

        fn resolve_method_owner<'a>(&self, owner: &'a str, _: &str, _: &str) -> Cow<'a, str> {
            Cow::Borrowed(owner)
        }
    }

    #[test]
    fn test_identity() {
        let resolver = IdentityResolver;
        assert_eq!(resolver.resolve_field_owner("a/A", "x", "I"), "a/A");
        assert_eq!(resolver.resolve_method_owner("a/A", "m", "()V"), "a/A");
    }

    #[test]
    fn test_custom_resolver_as_trait_object() {
        let resolver: Box<dyn OwnerResolver> = Box::new(ParentResolver);
        assert_eq!(resolver.resolve_field_owner("a/Child", "inherited", "I"), "a/Parent");
        assert_eq!(resolver.resolve_field_owner("a/Child", "own", "I"), "a/Child");
    }
}
