//! Basic usage example for `dekvault`.

use dekvault::cipher;
use dekvault::prelude::*;
use dekvault_store_file::FileDataKeyStore;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("dekvault Basic Usage Example");
    println!("============================\n");

    let store_path = PathBuf::from("./example-data-keys.json");
    let store = FileDataKeyStore::open(&store_path)?;
    println!("✓ FileDataKeyStore opened at {}\n", store_path.display());

    // Encrypt new values under the root data key
    let config = SecretsConfig::new("example-secret").with_default_encryption_key("root");
    let secrets = SecretsService::new(store, config)?;

    // Creates the root data key on first run, no-op afterwards
    secrets.initialize().await?;
    println!("✓ Secrets service initialized\n");

    let plaintext = b"postgres://app:hunter2@db/app";
    println!("Plaintext: {}", String::from_utf8_lossy(plaintext));

    let blob = secrets.encrypt(plaintext).await?;
    let envelope = Envelope::from_bytes(&blob)?;
    println!("✓ Encrypted ({} bytes) under data key {:?}", blob.len(), envelope.key_name());

    let decrypted = secrets.decrypt(&blob).await?;
    assert_eq!(plaintext, &decrypted[..]);
    println!("✓ Decrypted: {}\n", String::from_utf8_lossy(&decrypted));

    // Values written before envelopes existed are still readable
    let legacy = cipher::seal(b"old-api-token", b"example-secret")?;
    let decrypted = secrets.decrypt(&legacy).await?;
    println!("✓ Legacy blob decrypted: {}\n", String::from_utf8_lossy(&decrypted));

    // Empty blobs stand for values that were never set
    assert!(secrets.decrypt(&[]).await?.is_empty());
    println!("✓ Empty blob decrypts to an empty value\n");

    println!("============================");
    println!("All operations successful!");
    println!("\nNote: {} can be deleted manually", store_path.display());

    Ok(())
}
