// Shared build script helper: turns a crate's README.md into its rustdoc front page.
// Include this in build.rs files with: include!("../build_common.rs");
//
// Required imports in the including file:
//   use std::env;
//   use std::fs;
//   use std::path::Path;

/// Copy `README.md` into `OUT_DIR/README_GENERATED.md`, rewriting links so
/// rustdoc can resolve them.
///
/// Rewrites:
/// 1. `](src/foo.rs)` becomes `](foo)` so links land on modules
/// 2. `](../../README.md` becomes the workspace repository URL
///
/// A crate without a README still gets an (empty) generated file so that
/// `include_str!` in `lib.rs` never fails.
fn render_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");
    println!("cargo:rerun-if-changed=../../Cargo.toml");

    let content = fs::read_to_string(Path::new(crate_dir).join("README.md")).unwrap_or_default();

    let mut rendered = content.replace("](src/", "](").replace(".rs)", ")");
    if let Some(url) = workspace_repository_url(crate_dir) {
        rendered = rendered.replace("](../../README.md", &format!("]({url}"));
    }

    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };
    if let Err(e) = fs::write(Path::new(&out_dir).join("README_GENERATED.md"), rendered) {
        println!("cargo:warning=failed to write README_GENERATED.md: {e}");
    }
}

/// Read `repository = "..."` from the workspace manifest two levels up.
fn workspace_repository_url(crate_dir: &str) -> Option<String> {
    let manifest = Path::new(crate_dir).parent()?.parent()?.join("Cargo.toml");
    let content = fs::read_to_string(manifest).ok()?;

    content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("repository") && line.contains('='))
        .find_map(|line| {
            let start = line.find('"')?;
            let end = line.rfind('"')?;
            (start < end).then(|| line[start + 1..end].to_string())
        })
}
