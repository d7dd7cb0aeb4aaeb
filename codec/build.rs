fn main() {
    if let Ok(dir) = std::env::var("OPUS_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }
    println!("cargo:rustc-link-lib=opus");
    println!("cargo:rerun-if-env-changed=OPUS_LIB_DIR");
}
