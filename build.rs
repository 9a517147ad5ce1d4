extern crate cc;

fn main() {
    println!("cargo:rerun-if-changed=resources/backend.cu");
    println!("cargo:rerun-if-env-changed=CUDA_LIB_DIR");

    if std::env::var_os("CARGO_FEATURE_CUDA").is_none() {
        return;
    }

    cc::Build::new()
        .cuda(true)
        .flag("-cudart=shared")
        .flag("-gencode=arch=compute_75,code=sm_75")
        .flag("-ccbin=clang")
        .file("resources/backend.cu")
        .compile("libbackend.a");

    // Path to the CUDA runtime library
    let cuda_lib_dir = std::env::var("CUDA_LIB_DIR").unwrap_or_else(|_| "/opt/cuda/lib64".into());

    println!("cargo:rustc-link-search=native={}", cuda_lib_dir);
    println!("cargo:rustc-link-lib=cudart");
}
