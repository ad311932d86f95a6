// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `encrypt` / `decrypt` subcommands for ENC: configuration strings.

use std::io::Read;

use gicli_core::{SecretBox, generate_master_key};

/// Build the secret box from `ENV_ENCRYPTION_KEY`, generating and reporting
/// a key when none is configured.
pub fn secret_box_from_env() -> anyhow::Result<SecretBox> {
    let key = match std::env::var("ENV_ENCRYPTION_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => {
            let generated = generate_master_key();
            eprintln!(
                "ENV_ENCRYPTION_KEY is not set; generated one for this invocation.\n\
                 Persist it to reuse the produced ciphertexts:\n\
                 ENV_ENCRYPTION_KEY={generated}"
            );
            generated
        }
    };
    Ok(SecretBox::new(&key)?)
}

pub fn encrypt(text: Option<&str>) -> anyhow::Result<()> {
    let plaintext = read_input(text)?;
    let secrets = secret_box_from_env()?;
    println!("{}", secrets.encrypt(&plaintext)?);
    Ok(())
}

pub fn decrypt(text: Option<&str>) -> anyhow::Result<()> {
    let ciphertext = read_input(text)?;
    let secrets = secret_box_from_env()?;
    println!("{}", secrets.decrypt(ciphertext.trim())?);
    Ok(())
}

/// The argument when given, otherwise all of stdin.
fn read_input(text: Option<&str>) -> anyhow::Result<String> {
    match text {
        Some(text) => Ok(text.to_string()),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            let trimmed = buffer.trim_end_matches('\n').to_string();
            if trimmed.is_empty() {
                anyhow::bail!("no input: pass a value or pipe it on stdin");
            }
            Ok(trimmed)
        }
    }
}
