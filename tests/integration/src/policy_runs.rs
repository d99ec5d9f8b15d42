//! Policy run scenarios
//!
//! Each scenario drives editors the way a hardening policy would: allocate
//! event ids for the policy, report, fix, commit, and later revert the whole
//! policy through the journal.

use std::path::PathBuf;
use std::sync::Arc;

use hostguard_editor::{ConfigEditor, DefaultsSetting, DesiredData, DialectKind, Intent};
use hostguard_exec::StaticElevation;
use hostguard_journal::{
    ChangeEvent, ChangeJournal, EventIdAllocator, JournalConfig, Reverter,
};
use hostguard_test_utils::{ScriptedRunner, TestHost};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn open_journal(host: &TestHost) -> ChangeJournal {
    let _ = hostguard_journal::logging::init();
    ChangeJournal::open(
        &JournalConfig::rooted_at(host.state_dir()),
        &StaticElevation(true),
    )
    .unwrap()
}

/// Report, fix and commit one text artifact under the next id of `ids`
fn apply_text(
    journal: &mut ChangeJournal,
    ids: &mut EventIdAllocator,
    kind: DialectKind,
    path: PathBuf,
    desired: DesiredData,
) {
    let tmp = path.with_extension("tmp");
    let mut editor = ConfigEditor::new(kind, path, tmp, desired, Intent::Present);
    if editor.report() {
        return;
    }
    assert!(editor.fix());
    editor.set_event_id(ids.next().unwrap());
    assert!(editor.commit(journal), "{:?}", editor.last_error());
}

// =============================================================================
// S1: Apply and revert a policy
// =============================================================================

mod s1_apply_and_revert {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn s1_1_text_changes_revert_to_original_bytes() {
        let host = TestHost::new();
        let sshd = host.write_file("etc/ssh/sshd_config", "# managed\nPermitRootLogin yes\nX11Forwarding yes\n");
        let login = host.write_file("etc/login.defs", "PASS_MAX_DAYS=99999\nUMASK=022");
        let mut journal = open_journal(&host);
        let mut ids = EventIdAllocator::new(42).unwrap();

        apply_text(
            &mut journal,
            &mut ids,
            DialectKind::Space,
            sshd,
            DesiredData::entries([("PermitRootLogin", "no")]),
        );
        apply_text(
            &mut journal,
            &mut ids,
            DialectKind::ClosedEq,
            login,
            DesiredData::entries([("PASS_MAX_DAYS", "180"), ("PASS_MIN_DAYS", "1")]),
        );

        assert_eq!(
            host.read_file("etc/login.defs"),
            "PASS_MAX_DAYS=180\nUMASK=022\nPASS_MIN_DAYS=1\n"
        );
        assert_eq!(journal.find_events_for_rule(42).unwrap().len(), 2);

        let report = Reverter::default().revert_rule(&mut journal, 42).unwrap();
        assert!(report.is_success());
        assert_eq!(report.reverted.len(), 2);
        assert_eq!(
            host.read_file("etc/ssh/sshd_config"),
            "# managed\nPermitRootLogin yes\nX11Forwarding yes\n"
        );
        assert_eq!(host.read_file("etc/login.defs"), "PASS_MAX_DAYS=99999\nUMASK=022");
        assert!(journal.find_events_for_rule(42).unwrap().is_empty());
    }

    #[test]
    fn s1_2_created_file_is_removed_on_revert() {
        let host = TestHost::new();
        let mut journal = open_journal(&host);
        let mut ids = EventIdAllocator::new("0007").unwrap();
        let path = host.path("etc/modprobe.d/blacklist.conf");

        apply_text(
            &mut journal,
            &mut ids,
            DialectKind::Space,
            path.clone(),
            DesiredData::entries([("blacklist", vec!["usb-storage", "firewire-core"])]),
        );
        assert!(matches!(
            journal.get_event("0007001").unwrap(),
            Some(ChangeEvent::Creation { .. })
        ));

        let report = Reverter::default().revert_rule(&mut journal, 7).unwrap();
        assert!(report.is_success());
        assert!(!path.exists());
    }

    #[test]
    fn s1_3_settings_are_undone_by_recorded_inverse() {
        let host = TestHost::new();
        let mut journal = open_journal(&host);
        let mut ids = EventIdAllocator::new(300).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("read com.apple.screensaver askForPassword", "0\n");

        let mut editor = ConfigEditor::new(
            DialectKind::Defaults,
            "com.apple.screensaver",
            host.path("unused.tmp"),
            DesiredData::settings([(
                "askForPassword",
                DefaultsSetting::write("1", ["-int", "1"]),
            )]),
            Intent::Present,
        )
        .with_runner(runner.clone());
        assert!(!editor.report());
        assert!(editor.fix());
        editor.set_event_id(ids.next().unwrap());
        assert!(editor.commit(&mut journal));
        runner.clear_calls();

        let report = Reverter::new(runner.clone())
            .revert_rule(&mut journal, 300)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(
            runner.call_strings(),
            vec!["/usr/bin/defaults -currentHost write com.apple.screensaver askForPassword 0".to_string()]
        );
    }
}

// =============================================================================
// S2: Journal lifetime
// =============================================================================

mod s2_journal_lifetime {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn s2_1_changes_revert_after_reopening_the_journal() {
        let host = TestHost::new();
        let conf = host.write_file("etc/app.conf", "foo = baz\n");
        {
            let mut journal = open_journal(&host);
            let mut ids = EventIdAllocator::new(12).unwrap();
            apply_text(
                &mut journal,
                &mut ids,
                DialectKind::OpenEq,
                conf,
                DesiredData::entries([("foo", "bar")]),
            );
            journal.close().unwrap();
        }

        let mut journal = open_journal(&host);
        let report = Reverter::default().revert_rule(&mut journal, 12).unwrap();
        assert!(report.is_success());
        assert_eq!(host.read_file("etc/app.conf"), "foo = baz\n");
    }

    #[test]
    fn s2_2_rerun_purges_stale_events_first() {
        let host = TestHost::new();
        let conf = host.write_file("etc/app.conf", "foo = 1\n");
        let mut journal = open_journal(&host);

        let mut first = EventIdAllocator::new(5).unwrap();
        apply_text(
            &mut journal,
            &mut first,
            DialectKind::OpenEq,
            conf.clone(),
            DesiredData::entries([("foo", "2")]),
        );

        let purged = journal.purge_rule(5).unwrap();
        assert_eq!(purged.len(), 1);

        let mut second = EventIdAllocator::new(5).unwrap();
        apply_text(
            &mut journal,
            &mut second,
            DialectKind::OpenEq,
            conf,
            DesiredData::entries([("foo", "3")]),
        );

        let report = Reverter::default().revert_rule(&mut journal, 5).unwrap();
        assert!(report.is_success());
        assert_eq!(host.read_file("etc/app.conf"), "foo = 2\n");
    }

    #[test]
    fn s2_3_compliant_host_records_nothing() {
        let host = TestHost::new();
        let conf = host.write_file("etc/app.conf", "foo = bar\n");
        let mut journal = open_journal(&host);
        let mut ids = EventIdAllocator::new(9).unwrap();

        apply_text(
            &mut journal,
            &mut ids,
            DialectKind::OpenEq,
            conf,
            DesiredData::entries([("foo", "bar")]),
        );
        assert!(journal.find_events_for_rule(9).unwrap().is_empty());
    }
}
