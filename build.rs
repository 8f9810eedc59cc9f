use std::fs;
use std::path::{Path, PathBuf};

// Counters must stay free of destinations and of their own output channel:
// nothing in the observability module may name an address, a URL or a logger.
const FORBIDDEN: [&str; 11] = [
    "std::net",
    "SocketAddr",
    "IpAddr",
    "Ipv4Addr",
    "Ipv6Addr",
    "Url",
    "reqwest",
    "tracing",
    "println!(",
    "eprintln!(",
    "Instant",
];

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR missing");
    let obs_dir = Path::new(&manifest_dir).join("src").join("observability");
    println!("cargo:rerun-if-changed={}", obs_dir.display());

    let mut files = Vec::new();
    collect_rs_files(&obs_dir, &mut files);
    for path in files {
        let contents = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
        enforce_observability_guards(&contents, &path);
    }
}

fn collect_rs_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, files);
        } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

fn enforce_observability_guards(contents: &str, path: &Path) {
    for token in FORBIDDEN {
        if contents.contains(token) {
            panic!(
                "Forbidden token `{}` in observability module: {}",
                token,
                path.display()
            );
        }
    }
}
