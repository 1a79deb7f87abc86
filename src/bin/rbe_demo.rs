//! End-to-end walkthrough of the registration-based encryption flow
//!
//! Sets up a system, registers a handful of users, encrypts to one of them,
//! fetches updates and decrypts — then prints the resulting parameter
//! footprint and the store digest. Not a benchmark: no timing, no CSV.
//!
//! Usage:
//!   rbe_demo [--max-users N] [--efficient] [--store PATH] [--parties K]
//!
//! Without `--store` the walkthrough runs against a throwaway database.

#![forbid(unsafe_code)]

use std::env;

use anyhow::{bail, Context};
use rand::rngs::OsRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rbe::{
    decrypt, encrypt, fetch_updates, keygen, parameter_sizes, register, setup, Decryption,
    OnExisting, Store, Variant,
};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let max_users: u64 = match parse_flag(&args, "--max-users") {
        Some(s) => s.parse().context("--max-users expects an integer")?,
        None => 16,
    };
    let variant = if has_flag(&args, "--efficient") {
        Variant::Efficient
    } else {
        Variant::Regular
    };

    let store = match parse_flag(&args, "--store") {
        Some(path) => Store::open(&path)?,
        None => Store::temporary()?,
    };
    let crs = setup(&store, max_users, variant, OnExisting::Reuse, &mut OsRng)?;
    info!(
        max_users = crs.max_users,
        block_size = crs.block_size,
        levels = crs.levels,
        ?variant,
        "system ready"
    );

    // Register the first block's worth of users (or fewer on request).
    let parties: u64 = match parse_flag(&args, "--parties") {
        Some(s) => s.parse().context("--parties expects an integer")?,
        None => crs.block_size.min(8),
    };
    if parties == 0 || parties > crs.max_users {
        bail!("--parties must be in [1, {}]", crs.max_users);
    }

    let mut users = Vec::new();
    for id in 0..parties {
        let keys = keygen(&crs, id, &mut OsRng);
        register(&crs, &store, id, &keys.pk, &keys.helping, variant)
            .with_context(|| format!("registering id {id}"))?;
        info!(id, pk = %hex::encode(rbe::group::encode_g1(&keys.pk)), "registered");
        users.push(keys);
    }

    // Encrypt a random message to the last registrant, then open it.
    let recipient = parties - 1;
    let message = rbe::group::random_message(&mut OsRng);
    let cts = encrypt(&crs, &store, recipient, &message, variant, &mut OsRng)?;
    let upds = fetch_updates(&crs, &store, recipient, variant)?;
    info!(
        recipient,
        ciphertexts = cts.len(),
        update_candidates = upds.len(),
        ciphertext_bytes = cts.iter().map(|c| c.serialized_size_bytes()).sum::<usize>(),
        "encrypted"
    );

    match decrypt(&crs, recipient, &users[recipient as usize].sk, &upds, &cts, None)? {
        Decryption::Message(m) if m == message => info!(recipient, "decryption recovered the message"),
        Decryption::Message(_) => bail!("decryption produced a different message"),
        Decryption::GetUpdate => bail!("decryption asked for newer updates unexpectedly"),
    }

    let sizes = parameter_sizes(&crs, &store, variant)?;
    info!(
        crs_bytes = sizes.crs_bytes,
        public_parameters_bytes = sizes.public_parameters_bytes,
        auxiliary_bytes = sizes.auxiliary_bytes,
        promotion_log_bytes = sizes.promotion_log_bytes,
        key_book_bytes = sizes.key_book_bytes,
        "parameter footprint"
    );
    info!(digest = %hex::encode(store.digest()?), "store digest");
    store.flush()?;
    Ok(())
}
