//! End-to-end weaving through the real pipeline, including the compiled
//! pointcut probe and a build-and-run of one woven tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use aspect_weaver::compiler::Weaver;

const ASPECT_SRC: &str = r#"
use agrt::{Aspect, Context, Pointcut, Value};

#[derive(Default)]
pub struct TagAspect;

impl Aspect for TagAspect {
    fn pointcut(&self) -> Pointcut {
        // Computed, not a literal: resolution must execute this.
        let name = "sayhello";
        Pointcut::call(&format!("crate::.*{}$", name))
    }
    fn advice(&mut self, ctx: &mut Context<'_>) -> Vec<Value> {
        let out = ctx.proceed();
        let s: String = agrt::unbox(out.into_iter().next().expect("result"), "result 0");
        vec![agrt::boxed(format!("{} [woven]", s))]
    }
}
"#;

// The call-site must sit outside macro token streams: the matcher walks
// syn expressions only and a use inside `println!(..)` is invisible to it.
const TARGET_MAIN: &str = r#"
pub fn sayhello(name: String) -> String {
    format!("hello, {}", name)
}

fn main() {
    let greeting = sayhello(String::from("world"));
    println!("{}", greeting);
}
"#;

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

struct Run {
    _dir: tempfile::TempDir,
    target: PathBuf,
    woven: PathBuf,
    aspect: PathBuf,
}

fn fixture(target_main: &str) -> Run {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target");
    let woven = dir.path().join("woven");
    let aspect = dir.path().join("tag_aspect.rs");
    write(&target.join("main.rs"), target_main);
    write(&aspect, ASPECT_SRC);
    Run {
        _dir: dir,
        target,
        woven,
        aspect,
    }
}

#[test]
fn test_weaves_and_runs_a_complete_tree() {
    let run = fixture(TARGET_MAIN);
    let weaver = Weaver {
        target: run.target.clone(),
        woven_root: run.woven.clone(),
        aspect_file: run.aspect.clone(),
    };
    let manifest = weaver.run().unwrap();

    let names: Vec<String> = manifest
        .files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["agrt.rs", "agaspect.rs", "main.rs"]);

    let main_src = fs::read_to_string(run.woven.join("main.rs")).unwrap();
    assert!(main_src.contains("pub mod agrt;"));
    assert!(main_src.contains("pub mod agaspect;"));
    assert!(main_src.contains("_ag_proxy_0"));

    // The woven tree is a complete program: build and run it.
    let status = Command::new("rustc")
        .args(["--edition", "2021", "main.rs", "-o", "app"])
        .current_dir(&run.woven)
        .status()
        .expect("rustc must be runnable");
    assert!(status.success(), "woven tree failed to compile");
    let output = Command::new(run.woven.join("app")).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "hello, world [woven]");
}

#[test]
fn test_zero_match_weave_writes_nothing() {
    let run = fixture("fn main() { println!(\"quiet\"); }");
    let weaver = Weaver {
        target: run.target.clone(),
        woven_root: run.woven.clone(),
        aspect_file: run.aspect.clone(),
    };
    let manifest = weaver.run().unwrap();
    assert!(manifest.is_empty());
    assert!(!run.woven.exists());
}

#[test]
fn test_ambiguous_symbols_skip_instead_of_abort() {
    let run = fixture(TARGET_MAIN);
    write(
        &run.target.join("util/helper.rs"),
        r#"
        pub fn sayhello(name: String) -> String { name }
        pub fn caller() -> String { sayhello(String::from("util")) }
        "#,
    );
    let weaver = Weaver {
        target: run.target.join("..."),
        woven_root: run.woven.clone(),
        aspect_file: run.aspect.clone(),
    };
    // Two files declare sayhello now, so the naive resolver cannot bind
    // the bare-name uses. Ambiguity skips the sites instead of aborting.
    let manifest = weaver.run().unwrap();
    assert!(manifest.is_empty());
}

#[test]
fn test_recursive_target_weaves_nested_site() {
    let run = fixture("fn main() {}");
    write(
        &run.target.join("util/helper.rs"),
        r#"
        pub fn sayhello(name: String) -> String { name }
        pub fn caller() -> String { sayhello(String::from("util")) }
        "#,
    );
    let weaver = Weaver {
        target: run.target.join("..."),
        woven_root: run.woven.clone(),
        aspect_file: run.aspect.clone(),
    };
    let manifest = weaver.run().unwrap();
    let names: Vec<String> = manifest
        .files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["agrt.rs", "agaspect.rs", "helper.rs"]);
    assert!(run.woven.join("util/helper.rs").is_file());
    // The untouched root file is copied by assembly.
    assert!(run.woven.join("main.rs").is_file());
    let helper = fs::read_to_string(run.woven.join("util/helper.rs")).unwrap();
    assert!(helper.contains("_ag_pgen_ag_proxy_0"));
}

#[test]
fn test_rewoven_output_weaves_again_without_error() {
    let run = fixture(TARGET_MAIN);
    let first = Weaver {
        target: run.target.clone(),
        woven_root: run.woven.clone(),
        aspect_file: run.aspect.clone(),
    };
    first.run().unwrap();

    let twice = run._dir.path().join("woven2");
    let second = Weaver {
        target: run.woven.clone(),
        woven_root: twice.clone(),
        aspect_file: run.aspect.clone(),
    };
    // Weaving a woven tree is permitted; the forwarding call inside the
    // generated proxy is itself a weavable site.
    second.run().unwrap();
    assert!(twice.join("main.rs").is_file());
}
