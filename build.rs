//! Build script for the measurement-set sink.
//! Only does anything when the `with_ms` feature links against an external
//! OSKAR measurement-set library; the default build never touches this.

fn main() {
    if std::env::var_os("CARGO_FEATURE_WITH_MS").is_none() {
        return;
    }

    // Path to the OSKAR measurement-set library, provided by the environment
    // since it is not vendored or published as a crate.
    let oskar_lib_path = std::env::var("OSKAR_MS_LIB_DIR")
        .unwrap_or_else(|_| "/usr/local/lib".to_string());

    println!("cargo:rustc-link-search=native={}", oskar_lib_path);
    println!("cargo:rustc-link-lib=dylib=oskar_ms");
    println!("cargo:rerun-if-env-changed=OSKAR_MS_LIB_DIR");
}
