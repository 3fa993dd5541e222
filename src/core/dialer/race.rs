//! 并行竞速：每个候选地址一个任务，单条有界通道汇聚结果。
//!
//! 协调者按到达顺序消费结果，第一个成功者立即返回；其余结果交给一个分离的
//! 清道夫任务，它恰好接收剩余 K-1 个结果并关闭迟到的连接，保证没有任务
//! 泄漏、没有连接泄漏。全部失败时返回最后观察到的错误。

use std::{future::Future, net::SocketAddr};

use tokio::sync::mpsc;

use crate::core::errors::DialError;

pub(crate) async fn run_race<C, F, Fut>(
    target: &str,
    addrs: Vec<SocketAddr>,
    attempt: F,
) -> Result<C, DialError>
where
    C: Send + 'static,
    F: Fn(SocketAddr) -> Fut,
    Fut: Future<Output = Result<C, DialError>> + Send + 'static,
{
    if addrs.is_empty() {
        return Err(DialError::NoAddresses(target.to_string()));
    }

    let fanout = addrs.len();
    let (tx, mut rx) = mpsc::channel::<Result<C, DialError>>(fanout);

    for addr in addrs {
        let tx = tx.clone();
        let fut = attempt(addr);
        tokio::spawn(async move {
            // 通道容量等于任务数，send 不会阻塞；接收端提前消失也无妨。
            let _ = tx.send(fut.await).await;
        });
    }
    drop(tx);

    let mut last_err: Option<DialError> = None;
    for consumed in 0..fanout {
        match rx.recv().await {
            Some(Ok(conn)) => {
                let remaining = fanout - 1 - consumed;
                if remaining > 0 {
                    tokio::spawn(async move {
                        let mut left = remaining;
                        while left > 0 {
                            match rx.recv().await {
                                // 迟到的赢家在这里被丢弃，连接随之关闭
                                Some(_) => left -= 1,
                                None => break,
                            }
                        }
                    });
                }
                return Ok(conn);
            }
            Some(Err(err)) => last_err = Some(err),
            None => break,
        }
    }

    Err(last_err.unwrap_or_else(|| DialError::NoAddresses(target.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::net::{TcpListener, TcpStream};

    async fn reserved_dead_addr() -> SocketAddr {
        // bind then drop so the port is very likely unused
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    fn connect_attempt(addr: SocketAddr) -> impl Future<Output = Result<TcpStream, DialError>> {
        async move {
            TcpStream::connect(addr)
                .await
                .map_err(|source| DialError::Connect {
                    addr: addr.to_string(),
                    source,
                })
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_losers_are_drained() {
        let live_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = reserved_dead_addr().await;

        let addrs = vec![dead, live_a.local_addr().unwrap(), live_b.local_addr().unwrap()];
        let live_ports = [
            live_a.local_addr().unwrap().port(),
            live_b.local_addr().unwrap().port(),
        ];

        let conn = run_race("race.test:443", addrs, connect_attempt)
            .await
            .unwrap();
        assert!(live_ports.contains(&conn.peer_addr().unwrap().port()));
    }

    #[tokio::test]
    async fn all_failures_return_an_error() {
        let dead_a = reserved_dead_addr().await;
        let dead_b = reserved_dead_addr().await;

        let err = run_race("race.test:443", vec![dead_a, dead_b], connect_attempt)
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Connect { .. }));
    }

    #[tokio::test]
    async fn empty_address_list_fails_without_spawning() {
        let err = run_race("race.test:443", Vec::new(), connect_attempt)
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::NoAddresses(_)));
    }

    #[tokio::test]
    async fn every_attempt_outcome_is_consumed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addrs = vec![live.local_addr().unwrap(); 3];

        let attempts = counter.clone();
        let conn = run_race("race.test:443", addrs, move |addr| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                TcpStream::connect(addr)
                    .await
                    .map_err(|source| DialError::Connect {
                        addr: addr.to_string(),
                        source: io::Error::new(source.kind(), source.to_string()),
                    })
            }
        })
        .await
        .unwrap();
        drop(conn);

        // wait for the stragglers to finish; the drainer owns them
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
