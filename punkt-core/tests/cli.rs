use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn temp_workspace() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn read_jsonl(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("read output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect()
}

fn write_jsonl(path: &Path, records: &[Value]) {
    let content: String = records.iter().map(|r| format!("{r}\n")).collect();
    fs::write(path, content).expect("write input");
}

fn bin(name: &str) -> Command {
    let mut cmd = Command::cargo_bin(name).expect("binary exists");
    cmd.arg("--quiet");
    cmd
}

#[test]
fn corrupt_adds_fields_deterministically() {
    let workspace = temp_workspace();
    let input = workspace.path().join("paragraphs.jsonl");
    let records: Vec<Value> = (0..20)
        .map(|i| serde_json::json!({"url": format!("u{i}"), "text": "Hei, dette er en setning. Og en til!"}))
        .collect();
    write_jsonl(&input, &records);

    let run = |output: &str| {
        let output = workspace.path().join(output);
        bin("corrupt")
            .args(["--seed", "42", "--input-file"])
            .arg(&input)
            .arg("--output-file")
            .arg(&output)
            .assert()
            .success();
        read_jsonl(&output)
    };

    let first = run("a.jsonl");
    assert_eq!(first, run("b.jsonl"));
    assert_eq!(first.len(), 20);
    for record in &first {
        assert!(record["corrupt"].is_string());
        assert!(record["corrupt_level"].as_u64().unwrap() <= 9);
        assert_eq!(record["text"], "Hei, dette er en setning. Og en til!");
    }
}

#[test]
fn corrupt_fixed_level() {
    let workspace = temp_workspace();
    let input = workspace.path().join("in.jsonl");
    let output = workspace.path().join("out.jsonl");
    write_jsonl(&input, &[serde_json::json!({"text": "Ja, Nei. Kanskje?"})]);

    bin("corrupt")
        .args(["--level", "8", "--input-file"])
        .arg(&input)
        .arg("--output-file")
        .arg(&output)
        .assert()
        .success();

    let records = read_jsonl(&output);
    assert_eq!(records[0]["corrupt"], "ja nei kanskje");
    assert_eq!(records[0]["corrupt_level"], 8);

    bin("corrupt")
        .args(["--level", "10", "--input-file"])
        .arg(&input)
        .arg("--output-file")
        .arg(&output)
        .assert()
        .failure();
}

#[test]
fn split_writes_files_and_info() {
    let workspace = temp_workspace();
    let input = workspace.path().join("data.jsonl");
    let out_dir = workspace.path().join("splits");
    let records: Vec<Value> = (0..30).map(|i| serde_json::json!({"id": i})).collect();
    write_jsonl(&input, &records);

    bin("split")
        .args(["--seed", "3", "--split", "test=5", "--split", "validation=5", "--split", "train=rest"])
        .arg("--input-file")
        .arg(&input)
        .arg("--output-dir")
        .arg(&out_dir)
        .assert()
        .success();

    assert_eq!(read_jsonl(&out_dir.join("test.jsonl")).len(), 5);
    assert_eq!(read_jsonl(&out_dir.join("validation.jsonl")).len(), 5);
    assert_eq!(read_jsonl(&out_dir.join("train.jsonl")).len(), 20);

    let info: Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("dataset_info.json")).unwrap()).unwrap();
    assert_eq!(info["total_samples"], 30);
    assert_eq!(info["splits"][2]["name"], "train");
    assert_eq!(info["format"], "jsonl");
}

#[test]
fn split_needs_a_destination() {
    let workspace = temp_workspace();
    let input = workspace.path().join("data.jsonl");
    write_jsonl(&input, &[serde_json::json!({"id": 1})]);

    bin("split").arg("--input-file").arg(&input).assert().failure();
}

#[test]
fn build_prompt_skips_failed_reasoning() {
    let workspace = temp_workspace();
    let input = workspace.path().join("reasoning.jsonl");
    let output = workspace.path().join("prompts.jsonl");
    let template = workspace.path().join("template.txt");
    fs::write(&template, "Sett inn tegn: ").unwrap();
    write_jsonl(
        &input,
        &[
            serde_json::json!({"corrupt": "hei du", "reasoning": "Komma mangler.", "original_text": "Hei, du."}),
            serde_json::json!({"corrupt": "x", "reasoning": "ERROR: Failed to get response from API", "original_text": "X."}),
        ],
    );

    bin("build_prompt")
        .arg("--input-file")
        .arg(&input)
        .arg("--output-file")
        .arg(&output)
        .arg("--template-file")
        .arg(&template)
        .assert()
        .success();

    let records = read_jsonl(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0]["text"],
        "Sett inn tegn: hei du<think>Komma mangler.</think>Hei, du."
    );
}

#[test]
fn score_prints_summary() {
    let workspace = temp_workspace();
    let input = workspace.path().join("completions.jsonl");
    let output = workspace.path().join("scored.jsonl");
    write_jsonl(
        &input,
        &[
            serde_json::json!({"completion": "tenker</think><answer>Hei, du.</answer>", "original_text": "Hei, du."}),
            serde_json::json!({"completion": "ingen svar", "original_text": "Hei, du."}),
            serde_json::json!({"original_text": "mangler"}),
        ],
    );

    let stdout = bin("score")
        .arg("--input-file")
        .arg(&input)
        .arg("--output-file")
        .arg(&output)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: Value = serde_json::from_slice(&stdout).expect("summary is JSON");
    assert_eq!(summary["scored"], 2);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["mean_format_reward"], 0.5);
    assert!(summary["mean_language_reward"].is_number());

    let scored = read_jsonl(&output);
    assert_eq!(scored[0]["corrupt_reward_binary"], 1.0);
    assert_eq!(scored[1]["corrupt_reward"], 0.0);
    assert!(scored[2].get("format_reward").is_none());
}

#[test]
fn filter_norwegian_keeps_bokmal_reasoning() {
    let workspace = temp_workspace();
    let input = workspace.path().join("reasoning.jsonl");
    let output = workspace.path().join("norsk.jsonl");
    write_jsonl(
        &input,
        &[
            serde_json::json!({"id": 0, "reasoning": "Her mangler det et komma etter ordet hei, og setningen skal slutte med punktum. Jeg må også gjøre om den første bokstaven til stor forbokstav, ellers blir det ikke riktig."}),
            serde_json::json!({"id": 1, "reasoning": "The sentence is missing a comma after the greeting, and it should end with a full stop instead of nothing."}),
            serde_json::json!({"id": 2, "corrupt": "uten resonnering"}),
        ],
    );

    bin("filter_norwegian")
        .arg("--input-file")
        .arg(&input)
        .arg("--output-file")
        .arg(&output)
        .assert()
        .success();

    let records = read_jsonl(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 0);
}

#[test]
fn filter_norwegian_rejects_unknown_language() {
    let workspace = temp_workspace();
    let input = workspace.path().join("reasoning.jsonl");
    write_jsonl(&input, &[serde_json::json!({"reasoning": "hei"})]);

    bin("filter_norwegian")
        .arg("--input-file")
        .arg(&input)
        .arg("--output-file")
        .arg(workspace.path().join("out.jsonl"))
        .arg("--language")
        .arg("klingon")
        .assert()
        .failure();
}

#[test]
fn stats_counts_levels() {
    let workspace = temp_workspace();
    let input = workspace.path().join("corrupted.jsonl");
    write_jsonl(
        &input,
        &[
            serde_json::json!({"text": "A.", "corrupt_level": 1}),
            serde_json::json!({"text": "B.", "corrupt_level": 1}),
            serde_json::json!({"text": "C.", "corrupt_level": 4}),
        ],
    );

    let stdout = bin("stats").arg(&input).assert().success().get_output().stdout.clone();
    let stats: Value = serde_json::from_slice(&stdout).expect("stats are JSON");
    assert_eq!(stats["records"], 3);
    assert_eq!(stats["levels"]["1"], 2);
    assert_eq!(stats["levels"]["4"], 1);
}

#[test]
fn wiki_paragraphs_from_local_dump() {
    let workspace = temp_workspace();
    let dump = workspace.path().join("dump.xml");
    let output = workspace.path().join("paragraphs.jsonl");
    fs::write(
        &dump,
        r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.11/">
  <page><title>Tromsø</title><revision><text>'''Tromsø''' er en by i [[Troms]] med mange innbyggere og et universitet.

{{Infoboks}}
== Historie ==
Kort.</text></revision></page>
  <page><title>Fil:Kart.png</title><revision><text>Dette er en fil med nok ord til å passere filteret.</text></revision></page>
</mediawiki>"#,
    )
    .unwrap();

    bin("wiki_paragraphs")
        .args(["--language", "no", "--minimum-words-paragraph", "5", "--workers", "2"])
        .arg("--temp-dump-file")
        .arg(&dump)
        .arg("--output-file")
        .arg(&output)
        .assert()
        .success();

    let records = read_jsonl(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["url"], "https://no.wikipedia.org/wiki/Tromsø");
    assert_eq!(records[0]["paragraph_number"], 1);
    assert_eq!(
        records[0]["text"],
        "Tromsø er en by i Troms med mange innbyggere og et universitet."
    );
}

#[test]
fn fetch_reasoning_needs_api_key() {
    let workspace = temp_workspace();
    let input = workspace.path().join("in.jsonl");
    let template = workspace.path().join("t.txt");
    write_jsonl(&input, &[serde_json::json!({"text": "Hei."})]);
    fs::write(&template, "{text}").unwrap();

    bin("fetch_reasoning")
        .env_remove("DEEP_INFRA")
        .arg("--input-file")
        .arg(&input)
        .arg("--template-file")
        .arg(&template)
        .assert()
        .failure();
}
