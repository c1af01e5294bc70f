// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![no_main]

use darkbio_ca::csr::decode;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must have passed its self-signature check, so
    // the summary has to render without panicking
    if let Ok(request) = decode(data) {
        let summary = request.summary();
        assert!(!summary.key_algorithm.is_empty());
        assert_eq!(request.key_algorithm().to_string(), summary.key_algorithm);
    }
});
