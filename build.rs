fn main() {
    // Only the `sdk` feature needs the NDI headers and library.
    #[cfg(feature = "sdk")]
    sdk::generate();
}

#[cfg(feature = "sdk")]
mod sdk {
    use std::env;
    use std::path::{Path, PathBuf};

    pub fn generate() {
        println!("cargo:rerun-if-env-changed=NDI_SDK_DIR");

        let ndi_sdk_path = sdk_dir();

        // The Advanced SDK ships a differently named library on Unix.
        let is_advanced = cfg!(unix) && ndi_sdk_path.to_lowercase().contains("advanced");

        let ndi_include_path = format!("{}/include", ndi_sdk_path);
        let main_header = format!("{}/Processing.NDI.Lib.h", ndi_include_path);
        if !Path::new(&main_header).exists() {
            panic!(
                "NDI SDK header not found at '{}'. Install the NDI SDK or set NDI_SDK_DIR.",
                main_header
            );
        }

        let (lib_name, link_type) = link_target(is_advanced);

        if cfg!(windows) {
            let target = env::var("TARGET").expect("TARGET environment variable not set");
            let lib_subdir = if target.contains("x86_64") { "x64" } else { "x86" };
            println!(
                "cargo:rustc-link-search=native={}\\lib\\{}",
                ndi_sdk_path, lib_subdir
            );
        }
        println!("cargo:rustc-link-lib={}={}", link_type, lib_name);

        let bindings = bindgen::Builder::default()
            .header(main_header)
            .clang_arg(format!("-I{}", ndi_include_path))
            .derive_default(true)
            .generate()
            .expect("Unable to generate NDI bindings");

        let out_path =
            PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR environment variable not set"));
        bindings
            .write_to_file(out_path.join("ndi_lib.rs"))
            .expect("Couldn't write NDI bindings");
    }

    fn sdk_dir() -> String {
        env::var("NDI_SDK_DIR").unwrap_or_else(|_| {
            if cfg!(unix) {
                let advanced = "/usr/share/NDI Advanced SDK for Linux";
                let standard = "/usr/share/NDI SDK for Linux";
                if Path::new(advanced).exists() {
                    advanced.to_string()
                } else {
                    standard.to_string()
                }
            } else if cfg!(windows) {
                "C:\\Program Files\\NDI SDK for Windows".to_string()
            } else {
                panic!("Unsupported platform, please set NDI_SDK_DIR manually.");
            }
        })
    }

    fn link_target(is_advanced: bool) -> (&'static str, &'static str) {
        if cfg!(unix) {
            if is_advanced {
                ("ndi_advanced", "dylib")
            } else {
                ("ndi", "dylib")
            }
        } else if cfg!(windows) {
            let target = env::var("TARGET").expect("TARGET environment variable not set");
            if target.contains("x86_64") {
                ("Processing.NDI.Lib.x64", "static")
            } else {
                ("Processing.NDI.Lib.x86", "static")
            }
        } else {
            panic!("Unsupported platform");
        }
    }
}
