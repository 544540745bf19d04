//! Signature sealing and verification through the public API.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use cortexkey_agent::core::{encrypt, verify, FeatureVector, Passphrase, Signature, SignatureCipher};
use cortexkey_agent::CryptoError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn features() -> FeatureVector {
    FeatureVector::from_bands(12.5, 48.0, 6.25, 90.0)
}

#[test]
fn test_cli_verify_flow() {
    let cipher = SignatureCipher::new(Passphrase::new("hunter2"));
    let printed = cipher.seal(&features()).unwrap().to_base64();

    // What `cortexkey verify` does with the printed text.
    let opened = SignatureCipher::new(Passphrase::new("hunter2"))
        .open_base64(&printed)
        .unwrap();
    assert_eq!(opened, features());
    assert_eq!(opened.alpha_beta_ratio, 48.0 / 6.25);
}

#[test]
fn test_wrong_passphrase_is_rejected() {
    let signature = encrypt(&features(), &Passphrase::new("right")).unwrap();
    assert!(matches!(
        verify(&signature, &Passphrase::new("wrong")),
        Err(CryptoError::Authentication)
    ));
}

#[test]
fn test_tampered_signature_is_rejected() {
    let passphrase = Passphrase::new("right");
    let encoded = encrypt(&features(), &passphrase).unwrap().to_base64();

    let mut bytes = URL_SAFE.decode(&encoded).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let tampered = Signature::from_base64(&URL_SAFE.encode(&bytes)).unwrap();

    assert!(matches!(
        verify(&tampered, &passphrase),
        Err(CryptoError::Authentication)
    ));
}

#[test]
fn test_garbage_input_is_malformed() {
    let cipher = SignatureCipher::new(Passphrase::new("right"));
    assert!(matches!(
        cipher.open_base64("not base64 at all!"),
        Err(CryptoError::Malformed(_))
    ));
    assert!(matches!(
        cipher.open_base64(&URL_SAFE.encode([0u8; 20])),
        Err(CryptoError::Malformed(_))
    ));
}

/// Values that stress the little-endian encoding and the ratio fields.
const SPECIAL_VALUES: [f64; 9] = [
    0.0,
    -0.0,
    -42.5,
    f64::MIN_POSITIVE / 4.0,
    f64::MIN_POSITIVE,
    f64::MAX,
    f64::MIN,
    1e12,
    1e-12,
];

const PASSPHRASE_CHARS: [char; 12] = [
    'a', 'Z', '7', ' ', '#', 'é', 'ß', 'ж', '密', '码', '🔑', '\u{200b}',
];

fn random_value(rng: &mut StdRng) -> f64 {
    if rng.gen_bool(0.3) {
        SPECIAL_VALUES[rng.gen_range(0..SPECIAL_VALUES.len())]
    } else {
        let magnitude = 10f64.powi(rng.gen_range(-300..300));
        rng.gen_range(-1.0..1.0) * magnitude
    }
}

fn random_passphrase(rng: &mut StdRng) -> String {
    let len = rng.gen_range(1..24);
    (0..len)
        .map(|_| PASSPHRASE_CHARS[rng.gen_range(0..PASSPHRASE_CHARS.len())])
        .collect()
}

#[test]
fn test_round_trip_for_random_vectors_and_passphrases() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for round in 0..300 {
        let mut values = [0.0; 6];
        for v in values.iter_mut() {
            *v = random_value(&mut rng);
        }
        let features = if round % 10 == 0 {
            // Band powers through the ratio path, including a zero denominator.
            FeatureVector::from_bands(0.0, random_value(&mut rng).abs(), 1e-300, 1.0)
        } else {
            FeatureVector::from_array(values)
        };

        let passphrase = Passphrase::new(random_passphrase(&mut rng));
        let signature = encrypt(&features, &passphrase).unwrap();
        let opened = verify(&signature, &passphrase).unwrap();
        assert_eq!(
            opened.to_array().map(f64::to_bits),
            features.to_array().map(f64::to_bits),
            "round {round}"
        );

        let other = Passphrase::new(format!("{}{}", random_passphrase(&mut rng), "x"));
        assert_ne!(other, passphrase);
        assert!(
            matches!(verify(&signature, &other), Err(CryptoError::Authentication)),
            "round {round}"
        );
    }
}
