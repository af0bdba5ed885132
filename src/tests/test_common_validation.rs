use std::time::Duration;

use crate::{BucketKey, Capacity, LockTtl, RefillRate};

#[test]
fn capacity_try_from_validates_min_1() {
    let c = Capacity::try_from(1u64).unwrap();
    assert_eq!(*c, 1u64);

    assert_eq!(
        Capacity::try_from(0u64).unwrap_err(),
        "Capacity must be at least 1"
    );
}

#[test]
fn refill_rate_try_from_validates_min_1() {
    let r = RefillRate::try_from(7u64).unwrap();
    assert_eq!(*r, 7u64);

    assert_eq!(
        RefillRate::try_from(0u64).unwrap_err(),
        "Refill rate must be at least 1"
    );
}

#[test]
fn lock_ttl_default_and_try_from_validate_nonzero_millis() {
    assert_eq!(*LockTtl::default(), Duration::from_secs(5));

    let t = LockTtl::try_from(Duration::from_millis(250)).unwrap();
    assert_eq!(*t, Duration::from_millis(250));

    assert_eq!(
        LockTtl::try_from(Duration::ZERO).unwrap_err(),
        "Lock TTL must be at least 1ms"
    );
    assert_eq!(
        LockTtl::try_from(Duration::from_micros(999)).unwrap_err(),
        "Lock TTL must be at least 1ms"
    );
}

#[test]
fn bucket_key_try_from_validates_shape() {
    let k = BucketKey::try_from("partner_api").unwrap();
    assert_eq!(&**k, "partner_api");
    assert_eq!(k.to_string(), "partner_api");

    assert_eq!(
        BucketKey::try_from("").unwrap_err(),
        "Bucket key must not be empty"
    );
    assert_eq!(
        BucketKey::try_from("a".repeat(256)).unwrap_err(),
        "Bucket key must not be longer than 255 characters"
    );
    assert!(BucketKey::try_from("a".repeat(255)).is_ok());
    assert_eq!(
        BucketKey::try_from("user:lock").unwrap_err(),
        "Bucket key must not contain colons"
    );
}

#[test]
fn bucket_key_default_prefix() {
    assert_eq!(&**BucketKey::default_prefix(), "tollgate");
}
