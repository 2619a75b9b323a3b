use num_bigint::BigUint;
use zkv_crypto::{decrypt_chunk, encrypt_chunk, generate_file_key, group, modpow, Prover};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_chunk(bencher: divan::Bencher, size: usize) {
    let file_key = generate_file_key();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encrypt_chunk(divan::black_box(&file_key), 0, divan::black_box(&data)).unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_chunk(bencher: divan::Bencher, size: usize) {
    let file_key = generate_file_key();
    let data = make_data(size);
    let encrypted = encrypt_chunk(&file_key, 0, &data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt_chunk(divan::black_box(&file_key), 0, divan::black_box(&encrypted)).unwrap()
        });
}

#[divan::bench]
fn bench_modpow_full_exponent(bencher: divan::Bencher) {
    let grp = group();
    let exponent = grp.q() - 12345u32;
    bencher.bench(|| modpow(grp.g(), divan::black_box(&exponent), grp.p()).unwrap());
}

#[divan::bench]
fn bench_public_key(bencher: divan::Bencher) {
    let passphrase = secrecy::SecretString::from("correct-horse".to_string());
    bencher.bench(|| Prover::new(divan::black_box(&passphrase)).public_key().unwrap());
}

#[divan::bench]
fn bench_library_modpow(bencher: divan::Bencher) {
    let grp = group();
    let exponent: BigUint = grp.q() - 12345u32;
    bencher.bench(|| grp.g().modpow(divan::black_box(&exponent), grp.p()));
}

fn main() {
    divan::main();
}
