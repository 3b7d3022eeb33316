// Concurrent writers and readers against the shared stores
//
// Run with: cargo test --test concurrency_test

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use mailpolicy::account::{InMemoryDirectory, StaticAuthorizer};
    use mailpolicy::filters::{Action, ConditionTree};
    use mailpolicy::{Ace, AccountId, Direction, Grantee, PolicyService, Rule};
    use std::sync::Arc;

    fn service() -> Arc<PolicyService> {
        Arc::new(PolicyService::new(
            Arc::new(InMemoryDirectory::new()),
            Arc::new(StaticAuthorizer::new()),
        ))
    }

    fn rules(prefix: &str, count: usize) -> Vec<Rule> {
        (0..count)
            .map(|i| {
                Rule::new(format!("{}-{}", prefix, i), ConditionTree::always())
                    .with_action(Action::new("keep"))
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_grants_all_land() {
        let service = service();
        let account = AccountId::new();

        let tasks = (0..32).map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service.permissions().grant(
                    account,
                    vec![
                        Ace::grant(Grantee::user(format!("u{}", i)), "viewFreeBusy"),
                        Ace::grant(Grantee::user(format!("u{}", i)), "invite"),
                    ],
                )
            })
        });

        for result in join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap().len(), 2);
        }

        let none: &[&str] = &[];
        assert_eq!(service.permissions().query(account, none).unwrap().len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_grant_and_revoke_of_same_entry() {
        let service = service();
        let account = AccountId::new();
        let entry = Ace::grant(Grantee::Public, "viewFreeBusy");

        let tasks = (0..20).map(|i| {
            let service = service.clone();
            let entry = entry.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    service.permissions().grant(account, vec![entry]).map(|_| ())
                } else {
                    service.permissions().revoke(account, &[entry]).map(|_| ())
                }
            })
        });
        for result in join_all(tasks).await {
            result.unwrap().unwrap();
        }

        // The entry is either present once or absent, never duplicated
        let none: &[&str] = &[];
        assert!(service.permissions().query(account, none).unwrap().len() <= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_partial_lists() {
        let service = service();
        let account = AccountId::new();
        let short = rules("short", 3);
        let long = rules("long", 11);

        service
            .filters()
            .replace(account, Direction::Incoming, short.clone())
            .unwrap();

        let writers = (0..16).map(|i| {
            let service = service.clone();
            let list = if i % 2 == 0 { long.clone() } else { short.clone() };
            tokio::spawn(async move {
                service
                    .filters()
                    .replace(account, Direction::Incoming, list)
                    .unwrap();
            })
        });
        let readers = (0..64).map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .filters()
                    .read(account, Direction::Incoming)
                    .unwrap()
                    .rules
            })
        });

        let (_, seen) = futures::join!(join_all(writers), join_all(readers));
        for list in seen {
            let list = list.unwrap();
            assert!(list == short || list == long, "saw a list of {} rules", list.len());
        }
    }
}
