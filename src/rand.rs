// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

/// generate creates an arbitrarily large buffer filled with randomness drawn
/// from the operating system. Every call reads fresh entropy; there is no
/// process-wide seeded generator to reuse.
pub fn generate(bytes: usize) -> Result<Vec<u8>, getrandom::Error> {
    let mut buf = vec![0u8; bytes];
    getrandom::fill(&mut buf[..])?;
    Ok(buf)
}

/// hex_suffix returns `bytes` random bytes rendered as lowercase hex, used to
/// derive unique object names such as `root-1f2e3d4c`.
pub fn hex_suffix(bytes: usize) -> Result<String, getrandom::Error> {
    Ok(hex::encode(generate(bytes)?))
}

#[cfg(test)]
mod test {
    use super::*;

    // Tests that generating different sized random buffers work. This test is
    // more of a smoke-test that the API works; it does not actually test the
    // quality of the generated random numbers.
    #[test]
    fn test_generate() {
        assert!(generate(0).unwrap().is_empty());
        assert_eq!(generate(1).unwrap().len(), 1);
        assert_eq!(generate(20).unwrap().len(), 20);
        assert_eq!(generate(1024 * 1024).unwrap().len(), 1024 * 1024);
    }

    // Tests that consecutive draws differ, i.e. nothing is replaying a seed.
    #[test]
    fn test_generate_distinct() {
        assert_ne!(generate(32).unwrap(), generate(32).unwrap());
    }

    #[test]
    fn test_hex_suffix() {
        let suffix = hex_suffix(4).unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
