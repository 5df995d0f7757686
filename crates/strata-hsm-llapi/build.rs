use std::env;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), BuildError> {
    println!("cargo:rerun-if-env-changed=LUSTRE_INCLUDE_DIR");
    println!("cargo:rerun-if-env-changed=LUSTRE_LIB_DIR");
    emit_reruns();

    if env::var_os("CARGO_FEATURE_LUSTRE").is_none() {
        return Ok(());
    }

    let mut bridge = cxx_build::bridge("src/ffi/bridge.rs");
    bridge.flag_if_supported("-std=c++17");
    bridge.file("src/ffi/copytool.cpp");
    bridge.include(PathBuf::from("src/ffi/include"));

    let include_override = env::var_os("LUSTRE_INCLUDE_DIR").map(PathBuf::from);
    let lib_override = env::var_os("LUSTRE_LIB_DIR").map(PathBuf::from);

    let mut include_dirs: Vec<PathBuf> = Vec::new();
    if let Some(path) = include_override {
        include_dirs.push(path);
    }
    if let Some(path) = lib_override.as_ref() {
        if include_dirs.is_empty() {
            return Err(BuildError::MissingIncludeDir);
        }
        println!("cargo:rustc-link-search=native={}", path.display());
        println!("cargo:rustc-link-lib=lustreapi");
    } else {
        match pkg_config::Config::new().probe("lustreapi") {
            Ok(library) => {
                include_dirs.extend(library.include_paths);
                for path in library.link_paths {
                    println!("cargo:rustc-link-search=native={}", path.display());
                }
                for lib in library.libs {
                    println!("cargo:rustc-link-lib={lib}");
                }
            }
            Err(err) => {
                // Lustre client packages rarely ship a .pc file; fall back to the
                // system search path.
                println!("cargo:warning=lustreapi pkg-config probe failed: {err}");
                println!("cargo:rustc-link-lib=lustreapi");
                include_dirs.push(PathBuf::from("/usr/include"));
            }
        }
    }

    if !include_dirs
        .iter()
        .any(|dir| dir.join("lustre").join("lustreapi.h").exists())
    {
        return Err(BuildError::MissingHeader);
    }
    for dir in &include_dirs {
        bridge.include(dir);
    }

    bridge.compile("strata-lustreapi");
    Ok(())
}

fn emit_reruns() {
    println!("cargo:rerun-if-changed=src/ffi/bridge.rs");
    println!("cargo:rerun-if-changed=src/ffi/include/strata/copytool.hpp");
    println!("cargo:rerun-if-changed=src/ffi/copytool.cpp");
}

#[derive(Debug)]
enum BuildError {
    MissingIncludeDir,
    MissingHeader,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIncludeDir => write!(f, "LUSTRE_LIB_DIR set without LUSTRE_INCLUDE_DIR"),
            Self::MissingHeader => write!(f, "lustre/lustreapi.h not found"),
        }
    }
}

impl Error for BuildError {}
