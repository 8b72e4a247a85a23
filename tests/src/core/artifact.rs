use crate::fixtures::{self, DEPOSIT, MIGRATE_TO, OWNER, WITHDRAW};
use splint_core::{ContractArtifact, Error, function_selector};

#[test]
fn wallet_artifacts_load() {
    fixtures::init_tracing();
    let (_dir, artifact) = fixtures::wallet_artifact().unwrap();

    assert_eq!(artifact.name, "Wallet");
    assert_eq!(artifact.runtime_code, fixtures::wallet_runtime().unwrap());
    assert!(artifact.init_code.ends_with(&artifact.runtime_code));
    for signature in [DEPOSIT, WITHDRAW, MIGRATE_TO, OWNER] {
        assert_eq!(
            artifact.selectors.get(signature),
            Some(&function_selector(signature)),
            "{signature}"
        );
    }
    assert_eq!(artifact.selector_of("migrateTo"), Some(function_selector(MIGRATE_TO)));
    artifact.ensure_no_constructor_args().unwrap();
}

#[test]
fn missing_runtime_is_reported_before_reading() {
    let dir = fixtures::write_wallet_artifacts().unwrap();
    std::fs::remove_file(dir.path().join("Wallet.bin-runtime")).unwrap();

    match ContractArtifact::load(dir.path(), "Wallet") {
        Err(Error::CompilationArtifactMissing { missing, expected }) => {
            assert!(missing.ends_with("Wallet.bin-runtime"));
            assert_eq!(expected, ContractArtifact::expected_files("Wallet"));
        }
        other => panic!("expected a missing artifact, got {other:?}"),
    }
}
