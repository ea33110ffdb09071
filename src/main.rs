//! Command-line entry point for the aspect weaver.

use std::env;
use std::path::PathBuf;

use aspect_weaver::compiler::Weaver;
use aspect_weaver::constants::DEFAULT_WOVEN_ROOT;
use aspect_weaver::debug_log;

fn print_usage() {
    eprintln!("Usage: aspect-weaver [OPTIONS] -t <target> <aspect-file>");
    eprintln!();
    eprintln!("Weave the aspect file's advice into a copy of the target tree.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <aspect-file>      Aspect definitions, one file, *_aspect.rs");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --target DIR   Target directory; append /... to recurse");
    eprintln!(
        "  -w, --woven DIR    Output root for the woven tree (default: {})",
        DEFAULT_WOVEN_ROOT
    );
    eprintln!("      --debug        Note the debug-log path in effect, if any");
    eprintln!("  -h, --help         Show this help message");
    eprintln!();
    eprintln!("Set ASPECT_WEAVER_DEBUG_LOG to a file path for a detailed trace.");
}

pub fn main() {
    let args: Vec<String> = env::args().collect();

    let mut target: Option<PathBuf> = None;
    let mut woven_root = PathBuf::from(DEFAULT_WOVEN_ROOT);
    let mut aspect_file: Option<PathBuf> = None;
    let mut announce_debug = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--target" | "-t" => {
                i += 1;
                if i < args.len() {
                    target = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: --target requires a directory argument");
                    std::process::exit(1);
                }
            }
            "--woven" | "-w" => {
                i += 1;
                if i < args.len() {
                    woven_root = PathBuf::from(&args[i]);
                } else {
                    eprintln!("Error: --woven requires a directory argument");
                    std::process::exit(1);
                }
            }
            "--debug" => announce_debug = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Error: unknown option {}", other);
                print_usage();
                std::process::exit(1);
            }
            other => {
                if aspect_file.is_some() {
                    eprintln!("Error: exactly one aspect file is expected");
                    std::process::exit(1);
                }
                aspect_file = Some(PathBuf::from(other));
            }
        }
        i += 1;
    }

    debug_log::init();
    if announce_debug && !debug_log::is_enabled() {
        eprintln!("Debug trace requested but ASPECT_WEAVER_DEBUG_LOG is not set");
    }

    let Some(target) = target else {
        eprintln!("Error: a target is required (-t <dir>)");
        print_usage();
        std::process::exit(1);
    };
    let Some(aspect_file) = aspect_file else {
        eprintln!("Error: an aspect file is required");
        print_usage();
        std::process::exit(1);
    };

    let weaver = Weaver {
        target,
        woven_root,
        aspect_file,
    };
    match weaver.run() {
        Ok(manifest) if manifest.is_empty() => {
            // Nothing matched; the target is usable as-is.
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("[aspect-weaver] error: {}", e);
            std::process::exit(1);
        }
    }
}
