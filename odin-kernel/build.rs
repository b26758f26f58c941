fn main() {
    // Only the bare-metal target links with the kernel layout
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg=-T{manifest_dir}/kernel.ld");
    }

    // Rerun if linker script changes
    println!("cargo:rerun-if-changed=kernel.ld");
}
