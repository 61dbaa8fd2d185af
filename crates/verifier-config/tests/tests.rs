// One integration-test binary for verifier-config; the cases live in `suite/`.

mod suite;
