fn main() {
    // Populates `built.rs` in OUT_DIR with the git commit hash and package metadata.
    built::write_built_file().expect("Failed to acquire build-time information");
}
