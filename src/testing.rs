//! Step documents shared by the unit tests.

use std::fs;

use tempfile::TempDir;

pub const ECHO: &str = r#"#!/usr/bin/env cwl-runner
cwlVersion: v1.0
class: CommandLineTool
baseCommand: echo
stdout: echoed.txt
inputs:
  message:
    type: string
    inputBinding:
      position: 1
outputs:
  echoed:
    type: File
    outputBinding:
      glob: echoed.txt
"#;

pub const WC: &str = r#"#!/usr/bin/env cwl-runner
cwlVersion: v1.0
class: CommandLineTool
baseCommand: wc
stdout: wced.txt
inputs:
  file2count:
    type: File
    inputBinding:
      position: 1
outputs:
  wced:
    type: File
    outputBinding:
      glob: wced.txt
"#;

pub const MULTIPLE_OUT_ARGS: &str = r#"#!/usr/bin/env cwl-runner
cwlVersion: v1.0
class: CommandLineTool
baseCommand: ["python", "-m", "nlppln.commands.multiple_out_args"]
inputs:
  - id: in-files
    type: File[]
  - id: out_dir
    type: string?
    inputBinding:
      prefix: --out_dir=
      separate: false
  - id: counselors
    type: ['null', 'string[]']
    inputBinding:
      prefix: -c
outputs:
  - id: out-files
    type: File[]
    outputBinding:
      glob: "*.txt"
  - id: meta-out
    type: File
    outputBinding:
      glob: "*.csv"
"#;

pub const ECHO_WC: &str = r#"#!/usr/bin/env cwl-runner
cwlVersion: v1.0
class: Workflow
inputs:
  wfmessage: string
outputs:
  wfcount:
    type: File
    outputSource: wc/wced
steps:
  echo:
    run: ../tools/echo.cwl
    in:
      message: wfmessage
    out:
      - echoed
  wc:
    run: ../tools/wc.cwl
    in:
      file2count: echo/echoed
    out:
      - wced
"#;

/// Writes `tools/{echo,wc,multiple-out-args}.cwl` and
/// `workflows/echo-wc.cwl` into a fresh temporary directory.
pub fn write_fixtures() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let tools = dir.path().join("tools");
    let workflows = dir.path().join("workflows");
    fs::create_dir_all(&tools).unwrap();
    fs::create_dir_all(&workflows).unwrap();

    fs::write(tools.join("echo.cwl"), ECHO).unwrap();
    fs::write(tools.join("wc.cwl"), WC).unwrap();
    fs::write(tools.join("multiple-out-args.cwl"), MULTIPLE_OUT_ARGS).unwrap();
    fs::write(workflows.join("echo-wc.cwl"), ECHO_WC).unwrap();

    dir
}
