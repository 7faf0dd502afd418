mod cli {
    use assert_cmd::prelude::*;
    use predicates::str::contains;
    use std::process::Command;
    use tempfile::TempDir;

    // `dbforge` with no args should exit with a non-zero code.
    #[test]
    fn cli_no_args() {
        Command::cargo_bin("dbforge").unwrap().assert().failure();
    }

    #[test]
    fn cli_version() {
        Command::cargo_bin("dbforge")
            .unwrap()
            .args(["-V"])
            .assert()
            .stdout(contains(env!("CARGO_PKG_VERSION")));
    }

    // `dbforge migrate` with no database url configured should fail rather than panic.
    #[test]
    fn migrate_without_url_fails() {
        Command::cargo_bin("dbforge")
            .unwrap()
            .env_remove("DATABASE_URL")
            .args(["migrate"])
            .assert()
            .failure()
            .stderr(contains("DATABASE_URL"));
    }

    #[test]
    fn new_creates_a_migration_file() {
        let dir = TempDir::new().unwrap();
        let migrations_dir = dir.path().join("migrations");

        Command::cargo_bin("dbforge")
            .unwrap()
            .args([
                "--url",
                "sqlite:test.db",
                "--migrations-dir",
                migrations_dir.to_str().unwrap(),
                "new",
                "create users",
            ])
            .assert()
            .success()
            .stdout(contains("created"));

        let entries: Vec<_> = std::fs::read_dir(&migrations_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn status_exit_code_reflects_pending_count() {
        let dir = TempDir::new().unwrap();
        let migrations_dir = dir.path().join("migrations");
        let db_path = dir.path().join("test.db");

        std::fs::create_dir_all(&migrations_dir).unwrap();
        std::fs::write(
            migrations_dir.join("20200101000000_create_widgets.sql"),
            "-- migrate:up\nCREATE TABLE widgets (id integer primary key);\n-- migrate:down\nDROP TABLE widgets;\n",
        )
        .unwrap();

        Command::cargo_bin("dbforge")
            .unwrap()
            .args([
                "--url",
                &format!("sqlite:{}", db_path.display()),
                "--migrations-dir",
                migrations_dir.to_str().unwrap(),
                "status",
                "--exit-code",
            ])
            .assert()
            .failure()
            .stdout(contains("1 pending"));
    }
}
