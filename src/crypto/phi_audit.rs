// Static check that no tracing call in the crate (library or integration
// tests) names a resident data field or a secret. Log lines may carry
// opaque ids only.
