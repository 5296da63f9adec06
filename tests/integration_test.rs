use secrethub::environment::resolve_environment;
use secrethub::error::ClientError;
use secrethub::template::{render, Variables};
use secrethub::{DirPath, LocalStore, PathKind, SecretPath, SecretsClient};
use tempfile::{tempdir, TempDir};

fn dir(path: &str) -> DirPath {
    DirPath::parse(path).unwrap()
}

fn secret(path: &str) -> SecretPath {
    SecretPath::parse(path).unwrap()
}

fn open_store() -> (TempDir, LocalStore) {
    secrethub::crypto::init().unwrap();
    let temp = tempdir().unwrap();
    let mut store = LocalStore::new(temp.path().join("store.dat"));
    store.create(None).unwrap();
    (temp, store)
}

#[test]
fn test_store_requires_init() {
    let temp = tempdir().unwrap();
    let mut store = LocalStore::new(temp.path().join("store.dat"));
    assert!(!store.exists());
    assert!(matches!(store.unlock(None), Err(ClientError::NotInitialized)));
    assert!(matches!(store.list_repos(), Err(ClientError::Locked)));
}

#[test]
fn test_encrypted_store_roundtrip() {
    secrethub::crypto::init().unwrap();
    let temp = tempdir().unwrap();
    let path = temp.path().join("nested").join("store.dat");

    let mut store = LocalStore::new(&path);
    store.create(Some("correct horse")).unwrap();
    store.create_dir(&dir("company/app"), false).unwrap();
    store.write_secret(&secret("company/app/token"), "s3cr3t").unwrap();
    assert!(store.is_encrypted().unwrap());

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("s3cr3t"));

    let mut reopened = LocalStore::new(&path);
    assert!(matches!(reopened.unlock(None), Err(ClientError::Locked)));
    assert!(matches!(reopened.unlock(Some("wrong")), Err(ClientError::Crypto(_))));
    reopened.unlock(Some("correct horse")).unwrap();
    assert_eq!(reopened.read_secret(&secret("company/app/token")).unwrap().data, "s3cr3t");
}

#[test]
fn test_encrypted_store_keeps_salt_across_saves() {
    secrethub::crypto::init().unwrap();
    let temp = tempdir().unwrap();
    let path = temp.path().join("store.dat");
    let envelope = || -> serde_json::Value { serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap() };

    let mut store = LocalStore::new(&path);
    store.create(Some("correct horse")).unwrap();
    let created = envelope();
    assert_eq!(created["payload"]["protection"], "passphrase");

    store.create_dir(&dir("company/app"), false).unwrap();
    store.write_secret(&secret("company/app/token"), "one").unwrap();
    store.write_secret(&secret("company/app/token"), "two").unwrap();
    let saved = envelope();
    assert_eq!(saved["payload"]["salt"], created["payload"]["salt"]);
    assert_ne!(saved["payload"]["nonce"], created["payload"]["nonce"]);
    assert_eq!(saved["created_at"], created["created_at"]);

    let mut reopened = LocalStore::new(&path);
    reopened.unlock(Some("correct horse")).unwrap();
    assert_eq!(reopened.read_secret(&secret("company/app/token")).unwrap().data, "two");
}

#[test]
fn test_plain_store_is_marked_unprotected() {
    let (temp, mut store) = open_store();
    store.create_dir(&dir("company/app"), false).unwrap();
    assert!(!store.is_encrypted().unwrap());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(temp.path().join("store.dat")).unwrap()).unwrap();
    assert_eq!(raw["payload"]["protection"], "plain");
    assert!(raw["payload"]["data"].is_object());
}

#[test]
fn test_secret_versions() {
    let (_temp, mut store) = open_store();
    store.create_dir(&dir("company/app"), false).unwrap();

    let path = secret("company/app/db_password");
    assert_eq!(store.write_secret(&path, "first").unwrap().version, 1);
    assert_eq!(store.write_secret(&path, "second").unwrap().version, 2);

    assert_eq!(store.read_secret(&path).unwrap().data, "second");
    assert_eq!(store.read_secret(&secret("company/app/db_password:1")).unwrap().data, "first");
    assert_eq!(store.read_secret(&secret("company/app/db_password:latest")).unwrap().data, "second");
    assert!(matches!(
        store.read_secret(&secret("company/app/db_password:7")),
        Err(ClientError::NotFound(_))
    ));

    let versions = store.list_versions(&path).unwrap();
    assert_eq!(versions.iter().map(|v| v.version).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_write_rejects_bad_targets() {
    let (_temp, mut store) = open_store();
    store.create_dir(&dir("company/app/db"), true).unwrap();

    assert!(matches!(
        store.write_secret(&secret("company/app/token:2"), "value"),
        Err(ClientError::InvalidValue(_))
    ));
    assert!(matches!(
        store.write_secret(&secret("company/app/token"), ""),
        Err(ClientError::InvalidValue(_))
    ));
    assert!(matches!(
        store.write_secret(&secret("company/app/db"), "value"),
        Err(ClientError::AlreadyExists(_))
    ));
    assert!(matches!(
        store.write_secret(&secret("company/other/token"), "value"),
        Err(ClientError::NotFound(_))
    ));
}

#[test]
fn test_mkdir_and_remove() {
    let (_temp, mut store) = open_store();

    assert!(matches!(
        store.create_dir(&dir("company/app/db/primary"), false),
        Err(ClientError::NotFound(_))
    ));
    store.create_dir(&dir("company/app/db/primary"), true).unwrap();
    store.create_dir(&dir("company/app/db/primary"), true).unwrap();
    assert!(matches!(
        store.create_dir(&dir("company/app/db"), false),
        Err(ClientError::AlreadyExists(_))
    ));

    store.write_secret(&secret("company/app/db/primary/password"), "pw").unwrap();
    assert_eq!(store.path_kind(&dir("company/app/db")).unwrap(), Some(PathKind::Dir));
    assert_eq!(
        store.path_kind(&dir("company/app/db/primary/password")).unwrap(),
        Some(PathKind::Secret)
    );
    assert_eq!(store.path_kind(&dir("company/app/missing")).unwrap(), None);

    store.remove_secret(&secret("company/app/db/primary/password")).unwrap();
    assert_eq!(store.path_kind(&dir("company/app/db/primary/password")).unwrap(), None);

    store.remove_dir(&dir("company/app/db")).unwrap();
    assert_eq!(store.path_kind(&dir("company/app/db")).unwrap(), None);
    assert_eq!(store.list_repos().unwrap(), vec![dir("company/app")]);

    store.remove_dir(&dir("company/app")).unwrap();
    assert!(store.list_repos().unwrap().is_empty());
}

#[test]
fn test_tree_snapshot() {
    let (_temp, mut store) = open_store();
    store.create_dir(&dir("company/app/db"), true).unwrap();
    store.write_secret(&secret("company/app/db/user"), "admin").unwrap();
    store.write_secret(&secret("company/app/token"), "t").unwrap();

    let tree = store.tree(&dir("company/app")).unwrap();
    assert_eq!(tree.parent_path(), "company");
    assert_eq!(tree.root().name, "app");
    assert_eq!(tree.dir_count(), 2);
    assert_eq!(tree.secret_count(), 2);

    let sub = store.tree(&dir("company/app/db")).unwrap();
    assert_eq!(sub.parent_path(), "company/app");
    let user = sub.secrets_in(sub.root()).next().unwrap();
    assert_eq!(sub.abs_secret_path(user.id).unwrap(), secret("company/app/db/user"));
}

#[test]
fn test_store_survives_reopen() {
    let (temp, mut store) = open_store();
    store.create_dir(&dir("company/app"), false).unwrap();
    store.write_secret(&secret("company/app/token"), "value").unwrap();

    let mut reopened = LocalStore::new(temp.path().join("store.dat"));
    reopened.unlock(None).unwrap();
    let stats = reopened.stats().unwrap();
    assert_eq!((stats.namespaces, stats.repos, stats.secrets), (1, 1, 1));
}

#[test]
fn test_inject_renders_tags() {
    let (_temp, mut store) = open_store();
    store.create_dir(&dir("company/app-dev"), false).unwrap();
    store.write_secret(&secret("company/app-dev/db_password"), "hunter2").unwrap();

    let vars = Variables::parse(&["env=dev".to_string()]).unwrap();
    let template = "password: {{ company/app-$env/db_password }}\nplain: value\n";
    let rendered = render(template, &vars, |path| {
        Ok::<_, secrethub::error::EnvironmentError>(store.read_secret(path).unwrap().data)
    })
    .unwrap();
    assert_eq!(rendered, "password: hunter2\nplain: value\n");
}

#[test]
fn test_environment_resolution() {
    let (_temp, mut store) = open_store();
    store.create_dir(&dir("company/app"), false).unwrap();
    store.write_secret(&secret("company/app/token"), "tok").unwrap();
    store.write_secret(&secret("company/app/db_password"), "pw").unwrap();

    let process_env = vec![
        ("HOME".to_string(), "/home/dev".to_string()),
        ("API_TOKEN".to_string(), "secrethub://company/app/token".to_string()),
        ("DB_PASSWORD".to_string(), "secrethub://company/app/token".to_string()),
    ];
    let env_file = "# database\nDB_PASSWORD={{ company/app/db_password }}\nexport DB_HOST=\"localhost\"\n";

    let vars = resolve_environment(&store, Some(env_file), process_env, &Variables::new()).unwrap();
    let names: Vec<&str> = vars.iter().map(|var| var.name.as_str()).collect();
    assert_eq!(names, vec!["API_TOKEN", "DB_HOST", "DB_PASSWORD"]);

    assert_eq!(vars[0].value, "tok");
    assert!(vars[0].secret);
    assert_eq!(vars[1].value, "localhost");
    assert!(!vars[1].secret);
    assert_eq!(vars[2].value, "pw");
    assert!(vars[2].secret);
}

#[test]
fn test_environment_missing_secret() {
    let (_temp, mut store) = open_store();
    store.create_dir(&dir("company/app"), false).unwrap();

    let process_env = vec![("TOKEN".to_string(), "secrethub://company/app/missing".to_string())];
    let result = resolve_environment(&store, None, process_env, &Variables::new());
    assert!(result.is_err());
}
