fn main() {
    // libpcap is found by the pcap crate on Unix; only the Npcap SDK needs help
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("windows") {
        // Tell cargo to look for libraries in the lib directory
        println!("cargo:rustc-link-search=native=lib");

        // Link against Npcap libraries
        println!("cargo:rustc-link-lib=wpcap");
        println!("cargo:rustc-link-lib=Packet");
    }

    println!("cargo:rerun-if-changed=lib");
    println!("cargo:rerun-if-changed=build.rs");
}
