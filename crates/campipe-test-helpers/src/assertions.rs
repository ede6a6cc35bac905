//! Assertion macros for pipeline tests.

/// Assert that a sequence is strictly increasing.
///
/// # Example
///
/// ```rust
/// use campipe_test_helpers::assert_monotonic;
///
/// assert_monotonic!(&[1u64, 2, 5, 9]);
/// ```
#[macro_export]
macro_rules! assert_monotonic {
    ($collection:expr $(,)?) => {
        let collection = $collection;
        let mut iter = collection.iter();
        if let Some(mut prev) = iter.next() {
            for (i, curr) in iter.enumerate() {
                if prev >= curr {
                    panic!(
                        "assertion failed: sequence is not strictly increasing\n  at index {}: {:?} >= {:?}",
                        i + 1,
                        prev,
                        curr
                    );
                }
                prev = curr;
            }
        }
    };
}

/// Assert that an expression is `Err` whose error matches a pattern.
///
/// # Example
///
/// ```rust
/// use campipe_test_helpers::assert_err_matches;
///
/// let result: Result<(), Option<u8>> = Err(Some(3));
/// assert_err_matches!(result, Some(3));
/// ```
#[macro_export]
macro_rules! assert_err_matches {
    ($result:expr, $pattern:pat $(if $guard:expr)? $(,)?) => {
        match $result {
            Err($pattern) $(if $guard)? => {}
            Err(other) => panic!(
                "assertion failed: error does not match `{}`\n  got: {:?}",
                stringify!($pattern),
                other
            ),
            Ok(_) => panic!(
                "assertion failed: expected Err matching `{}`, got Ok",
                stringify!($pattern)
            ),
        }
    };
}

/// Assert that an expression is `Ok`, returning the value.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr $(,)?) => {
        match $result {
            Ok(v) => v,
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
}
