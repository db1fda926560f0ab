use crate::actor::{
    spawn_actor_reserved, spawn_actor_with_shutdown, Actor, ActorHandle, Addr, Reserved,
};
use crate::system::{ActorSystem, ShutdownHandle};
use anyhow::Result;
use std::any::Any;
use std::collections::HashMap;

/// Two-phase actor wiring: reserve every mailbox, then start actors with
/// their dependencies' addresses injected.
pub struct Builder {
    sys: ActorSystem,
    // Concrete addresses by name for easy wiring.
    addrs: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            sys: ActorSystem::new(),
            addrs: HashMap::new(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.sys.shutdown_handle()
    }

    /// Reserve an actor and publish its `Addr` under `name`.
    pub fn reserve<A>(&mut self, name: &str, mailbox: usize) -> Reserved<A>
    where
        A: Actor,
        Addr<A>: Send + Sync,
    {
        let r = spawn_actor_reserved::<A>(name, mailbox);
        self.addrs.insert(name.to_string(), Box::new(r.addr()));
        r
    }

    /// Start a previously reserved actor and track its task.
    pub fn start_reserved<A>(&mut self, r: Reserved<A>, actor: A) -> &mut Self
    where
        A: Actor,
    {
        let shutdown_rx = self.sys.shutdown_notifier();
        let h = r.start_with_shutdown(actor, Some(shutdown_rx));
        self.sys.track(async move { h.task.await? });
        self
    }

    /// Spawn an actor and publish its `Addr` under `name` in one call.
    pub fn spawn<A>(&mut self, name: &str, mailbox: usize, actor: A) -> Addr<A>
    where
        A: Actor,
        Addr<A>: Send + Sync,
    {
        let shutdown_rx = self.sys.shutdown_notifier();
        let h: ActorHandle<A> = spawn_actor_with_shutdown(actor, mailbox, Some(shutdown_rx));
        let addr = h.addr.clone();
        self.sys.track(async move { h.task.await? });
        self.addrs.insert(name.to_string(), Box::new(addr.clone()));
        addr
    }

    /// Track a non-actor task (interval jobs, the HTTP server) for shutdown.
    pub fn track(&mut self, fut: impl std::future::Future<Output = Result<()>> + Send + 'static) {
        self.sys.track(fut);
    }

    /// Get a typed address by name.
    pub fn addr<A: Actor>(&self, name: &str) -> Option<Addr<A>> {
        self.addrs
            .get(name)
            .and_then(|b| b.downcast_ref::<Addr<A>>().cloned())
    }

    pub async fn graceful_shutdown(mut self) -> Result<()> {
        self.addrs.clear();
        self.sys.graceful_shutdown().await
    }

    /// Block until CTRL-C or an internal shutdown signal, then shut down.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        let mut shutdown_rx = self.sys.shutdown_notifier();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("system.ctrl_c");
            }
            _ = shutdown_rx.recv() => {}
        }
        self.graceful_shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Context;
    use tokio::sync::oneshot;

    struct Echo;

    #[async_trait::async_trait]
    impl Actor for Echo {
        type Msg = (u32, oneshot::Sender<u32>);

        async fn handle(&mut self, (n, reply): Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
            let _ = reply.send(n);
            Ok(())
        }
    }

    #[tokio::test]
    async fn reserved_addr_is_usable_before_start() {
        let mut b = Builder::new();
        let r = b.reserve::<Echo>("echo", 4);
        let addr: Addr<Echo> = b.addr("echo").unwrap();

        let (tx, rx) = oneshot::channel();
        addr.send((7, tx)).await.ok();
        b.start_reserved(r, Echo);
        assert_eq!(rx.await.unwrap(), 7);

        assert!(b.addr::<Echo>("missing").is_none());
        drop(addr);
        b.graceful_shutdown().await.unwrap();
    }
}
