//! Report, fix and commit through a real change journal

use std::sync::Arc;

use hostguard_editor::{
    Condition, ConfigEditor, DefaultsSetting, DesiredData, DialectKind, EditorError, Intent,
};
use hostguard_exec::{CommandSpec, StaticElevation};
use hostguard_journal::{ChangeEvent, ChangeJournal, EventId, JournalConfig};
use hostguard_test_utils::{ScriptedRunner, TestHost};
use pretty_assertions::assert_eq;

fn elevated(host: &TestHost) -> ChangeJournal {
    ChangeJournal::open(
        &JournalConfig::rooted_at(host.state_dir()),
        &StaticElevation(true),
    )
    .unwrap()
}

fn id(text: &str) -> EventId {
    EventId::parse(text).unwrap()
}

fn text_editor(host: &TestHost, kind: DialectKind, desired: DesiredData) -> ConfigEditor {
    ConfigEditor::new(
        kind,
        host.path("etc/app.conf"),
        host.path("etc/.app.conf.tmp"),
        desired,
        Intent::Present,
    )
}

#[test]
fn openeq_fix_commit_and_revert() {
    let host = TestHost::new();
    let target = host.write_file("etc/app.conf", "foo = baz\n");
    let mut journal = elevated(&host);
    let mut editor = text_editor(&host, DialectKind::OpenEq, DesiredData::entries([("foo", "bar")]));

    assert!(!editor.report());
    assert_eq!(editor.fixable_keys(), ["foo".to_string()]);
    assert!(editor.removable_keys().is_empty());

    assert!(editor.fix());
    assert_eq!(host.read_file("etc/.app.conf.tmp"), "foo = bar\n");

    editor.set_event_id(id("0042001"));
    assert!(editor.commit(&mut journal));
    assert_eq!(host.read_file("etc/app.conf"), "foo = bar\n");
    assert!(!host.exists("etc/.app.conf.tmp"));
    assert_eq!(
        journal.get_event("0042001").unwrap(),
        Some(ChangeEvent::Conf {
            filepath: target.clone()
        })
    );

    assert!(editor.report());
    assert!(editor.fixable_keys().is_empty());

    let archived = journal.archive().latest(&target).unwrap().unwrap();
    assert_eq!(std::fs::read_to_string(archived.path).unwrap(), "foo = baz\n");

    assert!(journal.revert_file_change(&target, "0042001").unwrap());
    assert_eq!(host.read_file("etc/app.conf"), "foo = baz\n");
}

#[test]
fn fix_is_idempotent() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "# header\nfoo = baz\n");
    let mut editor = text_editor(&host, DialectKind::OpenEq, DesiredData::entries([("foo", "bar")]));

    assert!(editor.fix());
    let first = host.read_file("etc/.app.conf.tmp");
    assert!(editor.fix());
    assert_eq!(host.read_file("etc/.app.conf.tmp"), first);
    assert!(editor.report());
}

#[cfg(unix)]
#[test]
fn commit_keeps_file_mode() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "foo = baz\n");
    host.set_mode("etc/app.conf", 0o640);
    let mut journal = elevated(&host);
    let mut editor = text_editor(&host, DialectKind::OpenEq, DesiredData::entries([("foo", "bar")]));

    assert!(editor.fix());
    editor.set_event_id(id("0042001"));
    assert!(editor.commit(&mut journal));
    assert_eq!(host.mode("etc/app.conf"), 0o640);
}

#[test]
fn absent_artifact_commits_as_creation() {
    let host = TestHost::new();
    let mut journal = elevated(&host);
    let mut editor = text_editor(&host, DialectKind::ClosedEq, DesiredData::entries([("foo", "bar")]));

    assert!(!editor.report());
    assert!(editor.fix());
    editor.set_event_id(id("0042002"));
    assert!(editor.commit(&mut journal));

    assert_eq!(host.read_file("etc/app.conf"), "foo=bar\n");
    assert_eq!(
        journal.get_event("0042002").unwrap(),
        Some(ChangeEvent::Creation {
            filepath: host.path("etc/app.conf")
        })
    );
}

#[test]
fn compliant_artifact_commits_nothing() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "foo = bar\n");
    let mut journal = elevated(&host);
    let mut editor = text_editor(&host, DialectKind::OpenEq, DesiredData::entries([("foo", "bar")]));

    assert!(editor.report());
    assert!(editor.fix());
    editor.set_event_id(id("0042003"));
    assert!(editor.commit(&mut journal));
    assert_eq!(journal.get_event("0042003").unwrap(), None);
    assert!(!host.exists("etc/.app.conf.tmp"));
}

#[test]
fn closedeq_flags_bad_spacing_and_fix_repairs_it() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "foo  =  bar\nother=1\n");
    let mut editor = text_editor(&host, DialectKind::ClosedEq, DesiredData::entries([("foo", "bar")]));

    assert!(!editor.report());
    assert!(matches!(
        editor.conditions(),
        [Condition::InvalidFormat { line: 1, .. }]
    ));
    assert!(editor.fix());
    assert_eq!(host.read_file("etc/.app.conf.tmp"), "foo=bar\nother=1\n");
    assert!(editor.report());
}

#[test]
fn closedeq_leaves_unmanaged_bad_spacing_alone() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "a=1\nother  =  x\n");
    let mut editor = text_editor(&host, DialectKind::ClosedEq, DesiredData::entries([("a", "2")]));

    assert!(!editor.report());
    assert!(editor.conditions().is_empty());
    assert!(editor.fix());
    assert_eq!(host.read_file("etc/.app.conf.tmp"), "a=2\nother  =  x\n");
    assert!(editor.report());
}

#[test]
fn space_dialect_keeps_every_listed_value() {
    let host = TestHost::new();
    host.write_file("etc/modprobe.d/blacklist.conf", "blacklist usb-storage\n");
    let mut editor = ConfigEditor::new(
        DialectKind::Space,
        host.path("etc/modprobe.d/blacklist.conf"),
        host.path("etc/modprobe.d/.blacklist.conf.tmp"),
        DesiredData::entries([("blacklist", vec!["usb-storage", "firewire-core", "bluetooth"])]),
        Intent::Present,
    );

    assert!(!editor.report());
    assert!(editor.fix());
    assert_eq!(
        host.read_file("etc/modprobe.d/.blacklist.conf.tmp"),
        "blacklist usb-storage\nblacklist firewire-core\nblacklist bluetooth\n"
    );
}

#[test]
fn tagconf_adds_missing_section() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "[main]\nPort = 22\n");
    let mut editor = text_editor(
        &host,
        DialectKind::TagConf,
        DesiredData::sections([("logging", [("Level", "info")])]),
    );

    assert!(!editor.report());
    assert_eq!(editor.fixable_keys(), ["logging.Level".to_string()]);
    assert!(editor.fix());
    assert_eq!(
        host.read_file("etc/.app.conf.tmp"),
        "[main]\nPort = 22\n\n[logging]\nLevel = info\n"
    );
}

#[test]
fn notpresent_reports_removables() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "foo = bar\nkeep = 1\n");
    let mut editor = text_editor(&host, DialectKind::OpenEq, DesiredData::entries([("foo", "")]));
    editor.set_intent(Intent::NotPresent);

    assert!(!editor.report());
    assert_eq!(editor.removable_keys(), ["foo".to_string()]);
    assert!(editor.fix());
    assert_eq!(host.read_file("etc/.app.conf.tmp"), "keep = 1\n");
}

#[test]
fn unelevated_journal_leaves_artifact_alone() {
    let host = TestHost::new();
    host.write_file("etc/app.conf", "foo = baz\n");
    let mut journal = ChangeJournal::open(
        &JournalConfig::rooted_at(host.state_dir()),
        &StaticElevation(false),
    )
    .unwrap();
    let mut editor = text_editor(&host, DialectKind::OpenEq, DesiredData::entries([("foo", "bar")]));

    assert!(editor.fix());
    editor.set_event_id(id("0042001"));
    assert!(!editor.commit(&mut journal));
    assert!(matches!(editor.last_error(), Some(EditorError::Journal(_))));
    assert_eq!(host.read_file("etc/app.conf"), "foo = baz\n");
}

#[test]
fn defaults_commit_records_inverse_command() {
    let host = TestHost::new();
    let mut journal = elevated(&host);
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond("read com.example.app a", "0\n");
    runner.fail("read com.example.app b", 1, "The domain/default pair does not exist");

    let mut editor = ConfigEditor::new(
        DialectKind::Defaults,
        "com.example.app",
        host.path("unused.tmp"),
        DesiredData::settings([
            ("a", DefaultsSetting::write("1", ["-int", "1"])),
            ("b", DefaultsSetting::write("1", ["-bool", "yes"])),
        ]),
        Intent::Present,
    )
    .with_runner(runner.clone())
    .with_current_host(false);

    assert!(!editor.report());
    assert_eq!(editor.fixable_keys(), ["a".to_string(), "b".to_string()]);
    assert!(editor.fix());
    runner.clear_calls();

    editor.set_event_id(id("0050001"));
    assert!(editor.commit(&mut journal));
    assert_eq!(
        runner.call_strings(),
        vec![
            "/usr/bin/defaults write com.example.app a -int 1".to_string(),
            "/usr/bin/defaults write com.example.app b -bool yes".to_string(),
        ]
    );
    assert_eq!(
        journal.get_event("0050001").unwrap(),
        Some(ChangeEvent::Command {
            command: CommandSpec::shell(
                "/usr/bin/defaults delete com.example.app b && /usr/bin/defaults write com.example.app a 0"
            )
        })
    );
}

#[test]
fn failed_setting_records_only_what_ran() {
    let host = TestHost::new();
    let mut journal = elevated(&host);
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond("read dom", "0\n");
    runner.fail("write dom b", 1, "rejected");

    let mut editor = ConfigEditor::new(
        DialectKind::Defaults,
        "dom",
        host.path("unused.tmp"),
        DesiredData::settings([
            ("a", DefaultsSetting::write("1", ["1"])),
            ("b", DefaultsSetting::write("1", ["1"])),
        ]),
        Intent::Present,
    )
    .with_runner(runner)
    .with_current_host(false);

    assert!(editor.fix());
    editor.set_event_id(id("0050002"));
    assert!(!editor.commit(&mut journal));
    assert_eq!(
        journal.get_event("0050002").unwrap(),
        Some(ChangeEvent::Command {
            command: CommandSpec::argv(["/usr/bin/defaults", "write", "dom", "a", "0"])
        })
    );
}
