//! Proptest generators for property-based testing.

use proptest::prelude::*;

use vaultgate_core::{AccessKey, ContentId, MasterKey, UserId};

/// Generate a valid identifier: non-empty, printable, within bounds.
pub fn identifier() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.:-]{1,64}".prop_map(String::from)
}

/// Generate a random ContentId.
pub fn content_id() -> impl Strategy<Value = ContentId> {
    identifier().prop_map(ContentId::new)
}

/// Generate a random UserId.
pub fn user_id() -> impl Strategy<Value = UserId> {
    identifier().prop_map(UserId::new)
}

/// Generate a random AccessKey.
pub fn access_key() -> impl Strategy<Value = AccessKey> {
    (content_id(), user_id()).prop_map(|(c, u)| AccessKey::new(c, u))
}

/// Generate a plausible content locator URL.
pub fn locator_url() -> impl Strategy<Value = String> {
    "[a-z0-9/._-]{1,128}".prop_map(|path| format!("https://cdn.example/{path}"))
}

/// Generate a valid TTL in days.
pub fn ttl_days() -> impl Strategy<Value = i64> {
    1i64..=3650
}

/// Generate a master key of valid length.
pub fn master_key() -> impl Strategy<Value = MasterKey> {
    prop::collection::vec(any::<u8>(), 32..=64)
        .prop_map(|bytes| MasterKey::from_bytes(bytes).expect("length is in range"))
}

/// Parameters for a full grant call.
#[derive(Debug, Clone)]
pub struct GrantParams {
    pub content_id: ContentId,
    pub user_id: UserId,
    pub url: String,
    pub transaction_id: String,
    pub ttl_days: i64,
}

impl Arbitrary for GrantParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (content_id(), user_id(), locator_url(), identifier(), ttl_days())
            .prop_map(|(content_id, user_id, url, transaction_id, ttl_days)| GrantParams {
                content_id,
                user_id,
                url,
                transaction_id,
                ttl_days,
            })
            .boxed()
    }
}
