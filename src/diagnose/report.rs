use std::fmt;

use crate::diagnose::deploy::DeployConfig;
use crate::diagnose::reference::{self, ActionScaleRules, JOINT_NAMES, OBSERVATION_TERMS};
use crate::error::DiagnoseError;

const RULE_WIDTH: usize = 80;
const FLOAT_EPS: f64 = 1e-9;

const TROUBLESHOOTING: [&str; 6] = [
    "policy weights are corrupted or belong to another task",
    "physics parameters differ (friction, mass, inertia)",
    "control frequency or decimation differs between simulators",
    "initial keyframe pose differs from the default joint positions",
    "gravity vector is projected into the wrong frame",
    "command ranges exceed those seen during training",
];

/// One numbered part of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: &'static str,
    pub lines: Vec<String>,
}

/// Side-by-side comparison of training and deployment settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    sections: Vec<Section>,
    issues: Vec<String>,
}

impl DiagnosticReport {
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

struct Builder {
    sections: Vec<Section>,
    issues: Vec<String>,
}

impl Builder {
    fn section(&mut self, title: &'static str) -> SectionWriter<'_> {
        self.sections.push(Section {
            title,
            lines: Vec::new(),
        });
        let index = self.sections.len() - 1;
        SectionWriter {
            builder: self,
            index,
        }
    }
}

struct SectionWriter<'a> {
    builder: &'a mut Builder,
    index: usize,
}

impl SectionWriter<'_> {
    fn line(&mut self, line: impl Into<String>) {
        self.builder.sections[self.index].lines.push(line.into());
    }

    fn fail(&mut self, issue: String) {
        self.line(format!("[FAIL] {issue}"));
        self.builder.issues.push(issue);
    }

    fn check(&mut self, ok: bool, pass: &str, issue: String) {
        if ok {
            self.line(format!("[ok]   {pass}"));
        } else {
            self.fail(issue);
        }
    }
}

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() <= FLOAT_EPS
}

fn fmt_list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
    format!("[{}]", items.join(", "))
}

/// Compare the deployment configuration against the training constants.
///
/// The report depends only on `deploy` and the constants in
/// [`reference`](crate::diagnose::reference).
pub fn diagnose(deploy: &DeployConfig) -> Result<DiagnosticReport, DiagnoseError> {
    let rules = ActionScaleRules::reference()?;
    let mut report = Builder {
        sections: Vec::new(),
        issues: Vec::new(),
    };

    joint_order(&mut report, deploy);
    default_positions(&mut report, deploy);
    action_scale(&mut report, deploy, &rules);
    observation_layout(&mut report, deploy);
    observation_scales(&mut report, deploy);
    pd_gains(&mut report, deploy);
    disabled_terms(&mut report, deploy);

    Ok(DiagnosticReport {
        sections: report.sections,
        issues: report.issues,
    })
}

fn joint_order(report: &mut Builder, deploy: &DeployConfig) {
    let mut s = report.section("Joint order");
    s.line(format!("Isaac Lab: {:?}", JOINT_NAMES));
    s.line(format!("MuJoCo:    {:?}", deploy.joint_names));

    s.check(
        JOINT_NAMES.len() == deploy.num_joints(),
        &format!("{} joints on both sides", JOINT_NAMES.len()),
        format!(
            "joint count differs: Isaac Lab {}, MuJoCo {}",
            JOINT_NAMES.len(),
            deploy.num_joints()
        ),
    );
    for (i, (isaac, mujoco)) in JOINT_NAMES.iter().zip(&deploy.joint_names).enumerate() {
        let expected = reference::strip_joint_suffix(isaac);
        if expected != mujoco {
            s.fail(format!("joint {i}: Isaac Lab '{isaac}' but MuJoCo '{mujoco}'"));
        }
    }
    let ordered = JOINT_NAMES
        .iter()
        .zip(&deploy.joint_names)
        .all(|(isaac, mujoco)| reference::strip_joint_suffix(isaac) == mujoco);
    if ordered && JOINT_NAMES.len() == deploy.num_joints() {
        s.line("[ok]   order matches");
    }
}

fn default_positions(report: &mut Builder, deploy: &DeployConfig) {
    let expected = reference::default_joint_pos();
    let mut s = report.section("Default joint positions");
    s.line(format!(
        "per leg [hip, thigh, calf] = {}",
        fmt_list(&reference::DEFAULT_LEG_POS)
    ));
    s.line(format!("MuJoCo default_joint_pos: {}", fmt_list(&deploy.default_joint_pos)));

    let mut all = true;
    for (i, (joint, want)) in JOINT_NAMES.iter().zip(&expected).enumerate() {
        match deploy.default_joint_pos.get(i) {
            Some(got) if same(*got, *want) => {}
            Some(got) => {
                all = false;
                s.fail(format!("default position of {joint}: expected {want}, found {got}"));
            }
            None => {
                all = false;
                s.fail(format!("default position of {joint} is missing"));
            }
        }
    }
    if all {
        s.line("[ok]   default positions match");
    }
}

fn action_scale(report: &mut Builder, deploy: &DeployConfig, rules: &ActionScaleRules) {
    let mut s = report.section("Action scale");
    let patterns: Vec<String> = reference::ACTION_SCALE_RULES
        .iter()
        .map(|(pattern, scale)| format!("{pattern} -> {scale}"))
        .collect();
    s.line(format!("Isaac Lab rules (first match wins): {}", patterns.join(", ")));
    s.line(format!("MuJoCo action_scale: {}", fmt_list(&deploy.action_scale)));
    s.line("expanded:");

    let mut all = true;
    for (i, joint) in JOINT_NAMES.iter().enumerate() {
        let want = rules.scale_for(joint);
        let got = deploy.action_scale.get(i).copied();
        let shown = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{v}"));
        s.line(format!("  [{i:2}] {joint:<20} {:<8} {}", shown(want), shown(got)));
        let ok = matches!((want, got), (Some(w), Some(g)) if same(w, g));
        if !ok {
            all = false;
            s.fail(format!(
                "action scale of {joint}: expected {}, found {}",
                shown(want),
                shown(got)
            ));
        }
    }
    if all {
        s.line("[ok]   action scales match");
    }
}

fn observation_layout(report: &mut Builder, deploy: &DeployConfig) {
    let mut s = report.section("Observation layout");

    s.line(format!("Isaac Lab ({} dims):", reference::observation_dims()));
    let mut offset = 0;
    for term in &OBSERVATION_TERMS {
        s.line(format!(
            "  [{offset:2}-{:2}] {:<20} ({} dims)",
            offset + term.dims - 1,
            term.name,
            term.dims
        ));
        offset += term.dims;
    }
    s.line(format!("MuJoCo ({} dims):", deploy.observation_dims()));
    let mut offset = 0;
    for term in &deploy.observations {
        let last = (offset + term.dims).saturating_sub(1);
        s.line(format!("  [{offset:2}-{last:2}] {:<20} ({} dims)", term.name, term.dims));
        offset += term.dims;
    }

    let mut all = deploy.observations.len() == OBSERVATION_TERMS.len();
    if !all {
        s.fail(format!(
            "observation term count differs: Isaac Lab {}, MuJoCo {}",
            OBSERVATION_TERMS.len(),
            deploy.observations.len()
        ));
    }
    let mut isaac_offset = 0;
    let mut mujoco_offset = 0;
    for (i, (isaac, mujoco)) in OBSERVATION_TERMS.iter().zip(&deploy.observations).enumerate() {
        let canonical = reference::canonical_term(&mujoco.name);
        if canonical != isaac.name {
            all = false;
            s.fail(format!(
                "observation {i}: Isaac Lab '{}' but MuJoCo '{}'",
                isaac.name, mujoco.name
            ));
        } else if mujoco.dims != isaac.dims {
            all = false;
            s.fail(format!(
                "observation '{}' has {} dims, Isaac Lab uses {}",
                mujoco.name, mujoco.dims, isaac.dims
            ));
        } else if mujoco_offset != isaac_offset {
            all = false;
            s.fail(format!(
                "observation '{}' starts at {}, Isaac Lab starts it at {}",
                mujoco.name, mujoco_offset, isaac_offset
            ));
        }
        isaac_offset += isaac.dims;
        mujoco_offset += mujoco.dims;
    }
    if all {
        s.line("[ok]   observation order matches Isaac Lab");
    }
}

fn observation_scales(report: &mut Builder, deploy: &DeployConfig) {
    let mut s = report.section("Observation scales");
    s.line(format!("{:<20} {:<12} {}", "term", "Isaac Lab", "MuJoCo"));

    for term in &OBSERVATION_TERMS {
        let deployed = deploy
            .observations
            .iter()
            .find(|t| reference::canonical_term(&t.name) == term.name);
        match deployed {
            Some(d) => {
                let ok = same(d.scale, term.scale);
                let mark = if ok { "ok" } else { "FAIL" };
                s.line(format!("{:<20} {:<12} {:<6} {mark}", term.name, term.scale, d.scale));
                if !ok {
                    s.fail(format!(
                        "observation scale of {}: expected {}, found {}",
                        term.name, term.scale, d.scale
                    ));
                }
            }
            None => {
                s.line(format!("{:<20} {:<12} {:<6} FAIL", term.name, term.scale, "-"));
                s.fail(format!("observation '{}' is not deployed", term.name));
            }
        }
    }
}

fn pd_gains(report: &mut Builder, deploy: &DeployConfig) {
    let mut s = report.section("PD gains");
    s.line(format!("Isaac Lab: Kp {} / Kd {} (all joints)", reference::KP, reference::KD));
    s.line(format!("MuJoCo kp: {}", fmt_list(&deploy.kp)));
    s.line(format!("MuJoCo kd: {}", fmt_list(&deploy.kd)));
    s.line("note: Isaac Lab defines the gains on the articulation actuator config");

    let kp_ok = deploy.kp.len() == JOINT_NAMES.len()
        && deploy.kp.iter().all(|k| same(*k, reference::KP));
    let kd_ok = deploy.kd.len() == JOINT_NAMES.len()
        && deploy.kd.iter().all(|k| same(*k, reference::KD));
    s.check(
        kp_ok,
        "Kp matches",
        format!("Kp differs from {} on at least one joint", reference::KP),
    );
    s.check(
        kd_ok,
        "Kd matches",
        format!("Kd differs from {} on at least one joint", reference::KD),
    );
}

fn disabled_terms(report: &mut Builder, deploy: &DeployConfig) {
    let mut s = report.section("Disabled terms");
    for disabled in reference::DISABLED_TERMS {
        let present = deploy
            .observations
            .iter()
            .any(|t| reference::canonical_term(&t.name) == disabled);
        s.check(
            !present,
            &format!("{disabled} disabled"),
            format!("{disabled} is disabled in Isaac Lab but present in the MuJoCo observations"),
        );
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);

        writeln!(f, "{heavy}")?;
        writeln!(f, "MuJoCo vs Isaac Lab configuration")?;
        writeln!(f, "{heavy}")?;
        for (i, section) in self.sections.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "{}. {}", i + 1, section.title)?;
            writeln!(f, "{light}")?;
            for line in &section.lines {
                writeln!(f, "{line}")?;
            }
        }

        writeln!(f)?;
        writeln!(f, "{heavy}")?;
        if self.issues.is_empty() {
            writeln!(f, "all configuration matches")?;
        } else {
            writeln!(f, "{} issue(s) found:", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  - {issue}")?;
            }
        }
        writeln!(f, "{heavy}")?;

        writeln!(f)?;
        writeln!(f, "If the robot still does not walk, check:")?;
        for (i, hint) in TROUBLESHOOTING.iter().enumerate() {
            writeln!(f, "{}. {hint}", i + 1)?;
        }
        Ok(())
    }
}
