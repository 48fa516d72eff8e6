//! Lookups racing configuration changes only ever see valid realms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sr_integration_tests::{users, TestEnv};
use sr_realm::{AuthenticationDefinition, Change, Operation, RealmDefinition};
use sr_spi::{AuthMechanism, Credentials};

const REALM: &str = "ManagementRealm";
const READERS: usize = 8;
const CHANGES: usize = 200;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_half_applied_change() -> anyhow::Result<()> {
    let mut env = TestEnv::new();
    env.protocol.apply(Change::new().with(Operation::AddRealm(
        RealmDefinition::new(REALM).with_authentication(users(&[("admin", "changeit")])),
    )))?;

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::with_capacity(READERS);
    for _ in 0..READERS {
        let registry = env.registry.clone();
        let stop = Arc::clone(&stop);
        readers.push(tokio::spawn(async move {
            let mut observed = 0usize;
            loop {
                let realm = registry.lookup(REALM)?.expect("realm is never withdrawn");
                assert_eq!(realm.supported_mechanisms()[0], AuthMechanism::Plain);
                realm
                    .authenticate(&Credentials::password("admin", "changeit"))
                    .await?;
                observed += 1;
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            anyhow::Ok(observed)
        }));
    }

    let mut rejected = 0;
    for i in 0..CHANGES {
        let result = if i % 2 == 0 {
            let user = format!("user{i}");
            env.protocol.apply(Change::new().with(Operation::UpdateAuthentication {
                realm: REALM.into(),
                mechanism: users(&[("admin", "changeit"), (user.as_str(), "pw")]),
            }))
        } else {
            // Rejected: a second authentication mechanism.
            env.protocol.apply(Change::new().with(Operation::AddAuthentication {
                realm: REALM.into(),
                mechanism: AuthenticationDefinition::Kerberos { remove_realm: false },
            }))
        };
        if result.is_err() {
            rejected += 1;
        }
        tokio::task::yield_now().await;
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        let observed = reader.await??;
        assert!(observed > 0);
    }
    assert_eq!(rejected, CHANGES / 2);
    assert_eq!(
        env.protocol.model().get(REALM).map(|r| r.authentication.len()),
        Some(1)
    );
    Ok(())
}
