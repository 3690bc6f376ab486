//! Assertion generator — component B.
//!
//! Pure derivation of AAL/IAL from an ordered list of authenticator
//! references. No IO; every operation is a plain function over values.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::AssuranceError;
use crate::registry::{AuthenticatorRegistry, FactorCategory, Ial};

/// Authenticator Assurance Level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Aal {
    #[serde(rename = "AAL1")]
    Aal1,
    #[serde(rename = "AAL2")]
    Aal2,
    #[serde(rename = "AAL3")]
    Aal3,
}

/// One successful factor within an assertion chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorReference {
    #[serde(rename = "authenticator")]
    pub authenticator_name: String,
    pub step: u32,
    pub timestamp: i64,
}

/// The ordered history of a session plus its derived assurance levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssuranceContext {
    pub aal: Aal,
    pub ial: Ial,
    pub authenticators: Vec<AuthenticatorReference>,
}

fn derive(
    refs: &[AuthenticatorReference],
    registry: &AuthenticatorRegistry,
) -> Result<(Aal, Ial), AssuranceError> {
    let mut categories: HashSet<FactorCategory> = HashSet::new();
    let mut highest_ial = Ial::Ial1;
    for r in refs {
        let meta = registry.get(&r.authenticator_name)?;
        categories.extend(meta.factor_categories.iter().copied());
        if meta.ial > highest_ial {
            highest_ial = meta.ial;
        }
    }

    let aal = match categories.len() {
        0 => return Err(AssuranceError::NoAuthenticators),
        1 => Aal::Aal1,
        2 => Aal::Aal2,
        _ if categories.contains(&FactorCategory::Inherence) => Aal::Aal3,
        _ => Aal::Aal2,
    };

    Ok((aal, highest_ial))
}

/// Build a fresh context from scratch. `refs` becomes `authenticators`
/// verbatim, in order; AAL/IAL are derived per the category-counting rule.
pub fn generate(
    refs: Vec<AuthenticatorReference>,
    registry: &AuthenticatorRegistry,
) -> Result<AssuranceContext, AssuranceError> {
    if refs.is_empty() {
        return Err(AssuranceError::NoAuthenticators);
    }
    let (aal, ial) = derive(&refs, registry)?;
    Ok(AssuranceContext {
        aal,
        ial,
        authenticators: refs,
    })
}

/// Append `new_ref` to `existing` at the next step and re-derive AAL/IAL.
pub fn update(
    existing: &AssuranceContext,
    mut new_ref: AuthenticatorReference,
    registry: &AuthenticatorRegistry,
) -> Result<AssuranceContext, AssuranceError> {
    new_ref.step = existing.authenticators.len() as u32 + 1;
    let mut authenticators = existing.authenticators.clone();
    authenticators.push(new_ref);
    let (aal, ial) = derive(&authenticators, registry)?;
    Ok(AssuranceContext {
        aal,
        ial,
        authenticators,
    })
}

/// Pure check against required AAL/IAL thresholds. Mutates nothing.
pub fn verify(
    context: &AssuranceContext,
    required_aal: Option<Aal>,
    required_ial: Option<Ial>,
) -> Result<(), AssuranceError> {
    if required_aal.is_none() && required_ial.is_none() {
        return Err(AssuranceError::NoAssuranceRequirements);
    }
    if let Some(aal) = required_aal {
        if context.aal < aal {
            return Err(AssuranceError::InsufficientAssurance);
        }
    }
    if let Some(ial) = required_ial {
        if context.ial < ial {
            return Err(AssuranceError::InsufficientAssurance);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AuthenticatorMetadata, AuthenticatorRegistry, IdpType};

    fn registry() -> AuthenticatorRegistry {
        let mut b = AuthenticatorRegistry::builder();
        b.register(AuthenticatorMetadata::new("Credentials", [FactorCategory::Knowledge]))
            .unwrap();
        b.register(AuthenticatorMetadata::new("SMSOTP", [FactorCategory::Possession]))
            .unwrap();
        b.register(AuthenticatorMetadata::new(
            "Passkey",
            [FactorCategory::Possession, FactorCategory::Inherence],
        ))
        .unwrap();
        b.register(AuthenticatorMetadata::new("OAuth", []).with_idp_type(IdpType::OAuth))
            .unwrap();
        b.build()
    }

    fn reference(name: &str, step: u32) -> AuthenticatorReference {
        AuthenticatorReference {
            authenticator_name: name.to_string(),
            step,
            timestamp: 1_700_000_000 + i64::from(step),
        }
    }

    #[test]
    fn single_factor_is_aal1() {
        let registry = registry();
        let ctx = generate(vec![reference("Credentials", 1)], &registry).unwrap();
        assert_eq!(ctx.aal, Aal::Aal1);
        assert_eq!(ctx.authenticators.len(), 1);
    }

    #[test]
    fn two_distinct_categories_is_aal2() {
        let registry = registry();
        let ctx = generate(vec![reference("Credentials", 1)], &registry).unwrap();
        let ctx = update(&ctx, reference("SMSOTP", 0), &registry).unwrap();
        assert_eq!(ctx.aal, Aal::Aal2);
        assert_eq!(ctx.authenticators[1].step, 2);
    }

    #[test]
    fn two_knowledge_factors_stay_aal1() {
        let registry = registry();
        let mut b = AuthenticatorRegistry::builder();
        b.register(AuthenticatorMetadata::new("Credentials", [FactorCategory::Knowledge]))
            .unwrap();
        b.register(AuthenticatorMetadata::new("PIN", [FactorCategory::Knowledge]))
            .unwrap();
        let registry = b.build();
        let ctx = generate(
            vec![reference("Credentials", 1), reference("PIN", 2)],
            &registry,
        )
        .unwrap();
        assert_eq!(ctx.aal, Aal::Aal1);
    }

    #[test]
    fn three_categories_with_inherence_is_aal3() {
        let registry = registry();
        let ctx = generate(vec![reference("Credentials", 1)], &registry).unwrap();
        let ctx = update(&ctx, reference("SMSOTP", 0), &registry).unwrap();
        let ctx = update(&ctx, reference("Passkey", 0), &registry).unwrap();
        assert_eq!(ctx.aal, Aal::Aal3);
        assert_eq!(ctx.authenticators.len(), 3);
    }

    #[test]
    fn empty_list_is_an_error() {
        let registry = registry();
        assert!(generate(vec![], &registry).is_err());
    }

    #[test]
    fn verify_requires_at_least_one_requirement() {
        let registry = registry();
        let ctx = generate(vec![reference("Credentials", 1)], &registry).unwrap();
        assert!(verify(&ctx, None, None).is_err());
        assert!(verify(&ctx, Some(Aal::Aal1), None).is_ok());
        assert!(verify(&ctx, Some(Aal::Aal2), None).is_err());
    }
}
