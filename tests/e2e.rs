use clap::Parser;
use jupygcc::Cli;
use std::io::Cursor;
use which::which;

fn gcc_missing() -> bool {
    if which("gcc").is_err() {
        eprintln!("Skipping test: gcc not available");
        return true;
    }
    false
}

async fn run_cli(args: &[&str], cell: &str) -> color_eyre::Result<String> {
    let cli = Cli::try_parse_from(std::iter::once("jupygcc").chain(args.iter().copied()))?;
    let mut input = Cursor::new(cell.to_string());
    let mut out = Vec::new();
    cli.execute(&mut input, &mut out).await?;
    Ok(String::from_utf8(out)?)
}

#[tokio::test]
async fn test_stdin_header_is_echoed() -> color_eyre::Result<()> {
    if gcc_missing() {
        return Ok(());
    }

    let output = run_cli(&["run"], "//| stdin: 5\nint x;\nscanf(\"%d\", &x);").await?;
    assert_eq!(output, "5\n\n");
    Ok(())
}

#[tokio::test]
async fn test_full_program_prints_exactly() -> color_eyre::Result<()> {
    if gcc_missing() {
        return Ok(());
    }

    let output = run_cli(
        &["run"],
        "#include <stdio.h>\nint main(){printf(\"hi\");return 0;}",
    )
    .await?;
    assert_eq!(output, "hi\n");
    Ok(())
}

#[tokio::test]
async fn test_syntax_error_shows_diagnostic() -> color_eyre::Result<()> {
    if gcc_missing() {
        return Ok(());
    }

    let output = run_cli(&["run"], "int x = ;").await?;
    assert!(output.starts_with("Compilation errors: "));
    assert!(output.contains("error"));
    Ok(())
}

#[tokio::test]
async fn test_cell_from_file_with_plain_magic() -> color_eyre::Result<()> {
    if gcc_missing() {
        return Ok(());
    }

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cell.c");
    std::fs::write(
        &path,
        "#include <stdio.h>\nint main(void) { puts(\"from file\"); return 0; }\n",
    )?;

    let output = run_cli(
        &["run", "--magic", "gcc_file", path.to_str().unwrap()],
        "",
    )
    .await?;
    assert_eq!(output, "from file\n\n");
    Ok(())
}

#[tokio::test]
async fn test_config_file_is_honored() -> color_eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("jupygcc.toml");
    std::fs::write(&path, "compiler = \"no-such-cc-jupygcc\"\n")?;

    let output = run_cli(&["run", "--config", path.to_str().unwrap()], "puts(\"x\");").await?;
    assert_eq!(
        output,
        "Running the program failed with error: Command not found: no-such-cc-jupygcc\n"
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_magic_is_reported() -> color_eyre::Result<()> {
    let output = run_cli(&["run", "--magic", "clang"], "int x;").await?;
    assert!(output.starts_with("UsageError: Cell magic `%%clang` not found."));
    Ok(())
}
