// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end rotation across key versions through the real repositories.

use std::collections::BTreeMap;
use std::sync::Arc;

use qa_server_config::{EncryptionConfig, Environment, SecretString};
use qa_server_db::testing::create_test_pool;
use qa_server_db::{
	EncryptedColumn, IntegrationKind, IntegrationRepository, NewIntegration,
	SqliteEncryptedRecordStore, TwoFactorRepository,
};
use qa_server_secrets::{KeyMaterial, KeyRotationJob, KeyVersion, RotationOptions, SecretCipher};

fn config(keys: &[(u32, &KeyMaterial)], current: Option<u32>) -> EncryptionConfig {
	let keys: BTreeMap<u32, SecretString> = keys.iter().map(|(v, k)| (*v, k.to_hex())).collect();
	EncryptionConfig::new(keys, current, Environment::Test).unwrap()
}

#[tokio::test]
async fn rotation_moves_every_column_to_the_new_version() {
	let v1 = KeyMaterial::generate();
	let v2 = KeyMaterial::generate();
	let pool = create_test_pool().await.unwrap();
	let integrations = IntegrationRepository::new(pool.clone());
	let two_factor = TwoFactorRepository::new(pool.clone());

	let before = SecretCipher::from_config(&config(&[(1, &v1)], None)).unwrap();
	let jira = integrations
		.create_integration(&NewIntegration {
			org_id: "org-acme".to_string(),
			kind: IntegrationKind::Jira,
			name: "Acme Jira".to_string(),
			webhook_url: before.encrypt("https://acme.atlassian.net/hooks/qa").unwrap(),
			access_token: Some(before.encrypt("jira-token-abc").unwrap()),
		})
		.await
		.unwrap();
	two_factor
		.upsert_secret("user-1", &before.encrypt("JBSWY3DPEHPK3PXP").unwrap())
		.await
		.unwrap();

	// Operator adds v2; v1 stays configured until rotation completes.
	let after = SecretCipher::from_config(&config(&[(1, &v1), (2, &v2)], None)).unwrap();
	assert_eq!(after.current_version(), KeyVersion::new(2).unwrap());

	let store = Arc::new(SqliteEncryptedRecordStore::new(pool.clone()));
	let report = KeyRotationJob::new(after.clone(), store.clone(), RotationOptions::default())
		.run()
		.await
		.unwrap()
		.into_result()
		.unwrap();
	assert_eq!(report.total, 3);
	assert_eq!(report.rotated, 3);

	// Once rotated, v1 can be retired.
	let v2_only = SecretCipher::from_config(&config(&[(2, &v2)], None)).unwrap();
	let stored = integrations.get_integration(&jira).await.unwrap().unwrap();
	assert_eq!(
		v2_only.decrypt(&stored.webhook_url).unwrap().expose(),
		"https://acme.atlassian.net/hooks/qa"
	);
	assert_eq!(
		v2_only
			.decrypt(stored.access_token.as_deref().unwrap())
			.unwrap()
			.expose(),
		"jira-token-abc"
	);
	let seed = two_factor.get("user-1").await.unwrap().unwrap().totp_secret;
	assert_eq!(v2_only.decrypt(&seed).unwrap().expose(), "JBSWY3DPEHPK3PXP");

	// A second run only replaces nonces.
	let again = KeyRotationJob::new(after, store, RotationOptions::default())
		.run()
		.await
		.unwrap();
	assert!(again.is_complete());
	assert_eq!(again.source_versions.get(&KeyVersion::new(2).unwrap()), Some(&3));
	let reseeded = two_factor.get("user-1").await.unwrap().unwrap().totp_secret;
	assert_ne!(reseeded, seed);
	assert_eq!(v2_only.decrypt(&reseeded).unwrap().expose(), "JBSWY3DPEHPK3PXP");
}

#[tokio::test]
async fn retiring_a_key_too_early_is_reported() {
	let v1 = KeyMaterial::generate();
	let v2 = KeyMaterial::generate();
	let v3 = KeyMaterial::generate();
	let pool = create_test_pool().await.unwrap();
	let two_factor = TwoFactorRepository::new(pool.clone());

	let v1_cipher = SecretCipher::from_config(&config(&[(1, &v1)], None)).unwrap();
	two_factor
		.upsert_secret("user-old", &v1_cipher.encrypt("seed-old").unwrap())
		.await
		.unwrap();
	let v2_cipher = SecretCipher::from_config(&config(&[(1, &v1), (2, &v2)], None)).unwrap();
	two_factor
		.upsert_secret("user-new", &v2_cipher.encrypt("seed-new").unwrap())
		.await
		.unwrap();

	// v1 dropped before its records were rotated.
	let v3_cipher = SecretCipher::from_config(&config(&[(2, &v2), (3, &v3)], None)).unwrap();
	let report = KeyRotationJob::new(
		v3_cipher,
		Arc::new(SqliteEncryptedRecordStore::new(pool)),
		RotationOptions {
			columns: vec![EncryptedColumn::TwoFactorTotpSecret],
			concurrency: 2,
			..Default::default()
		},
	)
	.run()
	.await
	.unwrap();

	assert_eq!(report.rotated, 1);
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].record_id, "user-old");
	assert!(report.into_result().is_err());
}
