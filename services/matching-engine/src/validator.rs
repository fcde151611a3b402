//! Pre-admission order validation
//!
//! Pure checks with no side effects. The caller supplies everything that
//! lives in storage (last nonce, resolved pair) through
//! [`ValidationContext`] and records the nonce only after admission.

use types::errors::ValidationError;
use types::ids::Address;
use types::order::Order;
use types::pair::Pair;

/// State the validator needs from outside the order itself
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    /// Configured exchange contract
    pub exchange_address: Address,
    /// Last admitted nonce of the order's owner; `None` for a fresh account
    pub last_nonce: Option<u64>,
    /// Pair resolved from the order's base/quote tokens
    pub pair: Option<&'a Pair>,
}

/// Validate an incoming order before admission.
///
/// Checks performed (in order, first failure wins):
/// 1. Base token differs from quote token
/// 2. Amount and price point are positive
/// 3. Nonce above the owner's last admitted nonce
/// 4. Exchange address matches the configured exchange
/// 5. Submitted hash equals the recomputed content hash
/// 6. Signature recovers to the owning account
/// 7. Pair exists, matches the order's pair name, and is active
pub fn validate_order(order: &Order, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
    // 1. Distinct tokens
    if order.base_token == order.quote_token {
        return Err(ValidationError::SameBaseAndQuote {
            token: order.base_token.to_string(),
        });
    }

    // 2. Positive quantities
    if order.amount.is_zero() {
        return Err(ValidationError::InvalidAmount);
    }
    if order.pricepoint.is_zero() {
        return Err(ValidationError::InvalidPricepoint);
    }

    // 3. Replay protection
    if let Some(last_seen) = ctx.last_nonce {
        if order.nonce <= last_seen {
            return Err(ValidationError::InvalidNonce {
                provided: order.nonce,
                last_seen,
            });
        }
    }

    // 4. Exchange contract
    if order.exchange_address != ctx.exchange_address {
        return Err(ValidationError::InvalidExchangeAddress {
            expected: ctx.exchange_address.to_string(),
            actual: order.exchange_address.to_string(),
        });
    }

    // 5. Tamper check
    let computed = order.compute_hash();
    if computed != order.hash {
        return Err(ValidationError::InvalidHash {
            computed: computed.to_string(),
            submitted: order.hash.to_string(),
        });
    }

    // 6. Signer recovery
    let signature = order
        .signature
        .as_ref()
        .ok_or(ValidationError::MissingSignature)?;
    let recovered = signature.recover(&order.hash)?;
    if recovered != order.user_address {
        return Err(ValidationError::SignerMismatch {
            claimed: order.user_address.to_string(),
            recovered: recovered.to_string(),
        });
    }

    // 7. Pair
    let pair = ctx.pair.ok_or_else(|| ValidationError::UnknownPair {
        base: order.base_token.to_string(),
        quote: order.quote_token.to_string(),
    })?;
    if pair.name() != order.pair_name {
        return Err(ValidationError::PairNameMismatch {
            submitted: order.pair_name.clone(),
            resolved: pair.name(),
        });
    }
    if !pair.active {
        return Err(ValidationError::InactivePair { pair: pair.name() });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{exchange, order, pair, wallet, ALICE, BOB};
    use types::errors::SigningError;
    use types::numeric::{Amount, PricePoint};
    use types::order::Side;

    fn ctx(pair: &Pair) -> ValidationContext<'_> {
        ValidationContext {
            exchange_address: exchange(),
            last_nonce: None,
            pair: Some(pair),
        }
    }

    #[test]
    fn test_valid_order_passes() {
        let pair = pair();
        let o = order(ALICE, Side::BUY, 10_000_000_000, 1_000_000, 1);
        assert_eq!(validate_order(&o, &ctx(&pair)), Ok(()));
    }

    #[test]
    fn test_same_base_and_quote_rejected_first() {
        let pair = pair();
        let mut o = order(ALICE, Side::BUY, 0, 1_000_000, 1);
        o.quote_token = o.base_token;
        // amount is also invalid, but the token check runs first
        assert!(matches!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::SameBaseAndQuote { .. })
        ));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let pair = pair();
        let o = order(ALICE, Side::BUY, 0, 1_000_000, 1);
        assert_eq!(validate_order(&o, &ctx(&pair)), Err(ValidationError::InvalidAmount));
    }

    #[test]
    fn test_zero_pricepoint_rejected() {
        let pair = pair();
        let o = order(ALICE, Side::SELL, 10, 0, 1);
        assert_eq!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::InvalidPricepoint)
        );
    }

    #[test]
    fn test_stale_nonce_rejected() {
        let pair = pair();
        let o = order(ALICE, Side::BUY, 10, 1_000_000, 5);
        let mut context = ctx(&pair);
        context.last_nonce = Some(5);
        assert_eq!(
            validate_order(&o, &context),
            Err(ValidationError::InvalidNonce {
                provided: 5,
                last_seen: 5
            })
        );

        context.last_nonce = Some(4);
        assert_eq!(validate_order(&o, &context), Ok(()));
    }

    #[test]
    fn test_first_nonce_of_fresh_account_accepted() {
        let pair = pair();
        let o = order(ALICE, Side::BUY, 10, 1_000_000, 0);
        assert_eq!(validate_order(&o, &ctx(&pair)), Ok(()));
    }

    #[test]
    fn test_wrong_exchange_rejected() {
        let pair = pair();
        let mut o = order(ALICE, Side::BUY, 10, 1_000_000, 1);
        o.exchange_address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        o.hash = o.compute_hash();
        o.sign(&wallet(ALICE));
        assert!(matches!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::InvalidExchangeAddress { .. })
        ));
    }

    #[test]
    fn test_tampered_amount_rejected() {
        let pair = pair();
        let mut o = order(ALICE, Side::BUY, 10, 1_000_000, 1);
        o.amount = Amount::new(1_000);
        assert!(matches!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::InvalidHash { .. })
        ));
    }

    #[test]
    fn test_unsigned_order_rejected() {
        let pair = pair();
        let mut o = order(ALICE, Side::BUY, 10, 1_000_000, 1);
        o.signature = None;
        assert_eq!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::MissingSignature)
        );
    }

    #[test]
    fn test_signature_from_other_wallet_rejected() {
        let pair = pair();
        let mut o = order(ALICE, Side::BUY, 10, 1_000_000, 1);
        o.sign(&wallet(BOB));
        assert!(matches!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupted_signature_rejected() {
        let pair = pair();
        let mut o = order(ALICE, Side::BUY, 10, 1_000_000, 1);
        if let Some(sig) = o.signature.as_mut() {
            sig.signature = "00".repeat(64);
        }
        assert_eq!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::InvalidSignature(SigningError::VerificationFailed))
        );
    }

    #[test]
    fn test_unknown_and_inactive_pair_rejected() {
        let mut pair = pair();
        let o = order(ALICE, Side::BUY, 10, 1_000_000, 1);
        let no_pair = ValidationContext {
            exchange_address: exchange(),
            last_nonce: None,
            pair: None,
        };
        assert!(matches!(
            validate_order(&o, &no_pair),
            Err(ValidationError::UnknownPair { .. })
        ));

        pair.active = false;
        assert!(matches!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::InactivePair { .. })
        ));
    }

    #[test]
    fn test_pair_name_mismatch_rejected() {
        let pair = pair();
        let mut o = order(ALICE, Side::BUY, 10, 1_000_000, 1);
        o.pair_name = "ZRX/DAI".to_string();
        assert!(matches!(
            validate_order(&o, &ctx(&pair)),
            Err(ValidationError::PairNameMismatch { .. })
        ));
    }

    #[test]
    fn test_price_is_not_checked_against_book() {
        let pair = pair();
        let o = order(ALICE, Side::SELL, 10, PricePoint::new(u128::MAX).as_u128(), 1);
        assert_eq!(validate_order(&o, &ctx(&pair)), Ok(()));
    }
}
