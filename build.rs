// build.rs

fn main() {
    // --- Locate the CAS-2D shared library ---
    // The library is loaded at run time, so pkg-config is only asked where it
    // lives. No link flags are emitted.
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=CAS_LIBRARY_DIR");

    if let Ok(dir) = std::env::var("CAS_LIBRARY_DIR") {
        println!("cargo:rustc-env=CAS_HARNESS_DEFAULT_LIB_DIR={}", dir);
        return;
    }

    let probe = pkg_config::Config::new()
        .cargo_metadata(false)
        .env_metadata(false)
        .probe("cas2d");

    match probe {
        Ok(library) => match library.link_paths.first() {
            Some(dir) => {
                println!(
                    "cargo:rustc-env=CAS_HARNESS_DEFAULT_LIB_DIR={}",
                    dir.display()
                );
            }
            None => {
                eprintln!("pkg-config found 'cas2d' but reported no library directory.");
            }
        },
        Err(_) => {
            // Not fatal: the library path can still come from config or
            // CAS_LIBRARY_PATH, or be resolved by the dynamic loader.
            eprintln!("pkg-config could not locate 'cas2d'. No default library directory.");
        }
    }
}
