use std::{fmt::Debug, marker::PhantomData, net::SocketAddr, rc::Rc, sync::Arc};

use anyhow::{anyhow, bail};
use futures::{
    channel::{
        mpsc::{channel, Receiver, Sender},
        oneshot::{channel as ochannel, Receiver as OReceiver, Sender as OSender},
    },
    SinkExt, StreamExt,
};
use monoio::{
    net::{TcpListener, TcpStream},
    utils::bind_to_cpu_set,
};
use service_async::{MakeService, Service};
use servolake_core::{config::RuntimeConfig, AnyError};
use servolake_services::common::PeerAddr;
use tracing::{error, info, warn};

use self::runtime::RuntimeWrapper;

mod runtime;

/// Owns the worker threads and the channels used to hand them listeners.
///
/// Every worker runs its own runtime and binds its own listener on the same address;
/// the kernel spreads connections across them.
pub struct Manager<F> {
    runtime_config: RuntimeConfig,
    workers: Vec<Sender<Update<F>>>,
}

impl<F> Manager<F> {
    pub fn new(runtime_config: RuntimeConfig) -> Self {
        Self {
            runtime_config,
            workers: Vec::new(),
        }
    }
}

impl<F, S> Manager<F>
where
    F: MakeService<Service = S> + Send + Sync + 'static,
    F::Error: Debug,
    S: Service<(TcpStream, PeerAddr)> + 'static,
    S::Error: Debug,
{
    pub fn spawn_workers(&mut self) -> anyhow::Result<Vec<std::thread::JoinHandle<()>>> {
        let cores = if self.runtime_config.cpu_affinity {
            std::thread::available_parallelism().ok()
        } else {
            None
        };

        let runtime_config = Arc::new(self.runtime_config.clone());
        let mut handles = Vec::with_capacity(self.runtime_config.worker_threads);
        for worker_id in 0..self.runtime_config.worker_threads {
            let (tx, rx) = channel(128);
            let runtime_config = runtime_config.clone();
            let handle = std::thread::Builder::new()
                .name(format!("servolake-worker-{worker_id}"))
                .spawn(move || {
                    if let Some(cores) = cores {
                        let core = worker_id % cores;
                        if let Err(e) = bind_to_cpu_set([core]) {
                            warn!("bind thread {worker_id} to core {core} failed: {e}");
                        }
                    }
                    let mut runtime = match RuntimeWrapper::try_from(runtime_config.as_ref()) {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            error!("worker {worker_id} cannot build its runtime: {e}");
                            return;
                        }
                    };
                    info!("worker {worker_id} running on {:?}", runtime.kind());
                    runtime.block_on(WorkerController::<F, S>::default().run_controller(rx));
                })
                .map_err(|e| anyhow!("start worker thread {worker_id} failed: {e}"))?;
            self.workers.push(tx);
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Send `cmd` to every worker and collect their answers in worker order.
    pub async fn apply(&mut self, cmd: Command<F>) -> Vec<Result<(), AnyError>> {
        let mut results = Vec::with_capacity(self.workers.len());
        for sender in self.workers.iter_mut() {
            let (upd, rx) = Update::new(cmd.clone());
            match sender.feed(upd).await {
                Ok(_) => match rx.await {
                    Ok(r) => results.push(r),
                    Err(e) => results.push(Err(e.into())),
                },
                Err(e) => results.push(Err(e.into())),
            }
        }
        results
    }
}

/// It should be cheap to clone.
pub enum Command<F> {
    Add {
        name: String,
        factory: Arc<F>,
        addr: SocketAddr,
    },
}

impl<F> Clone for Command<F> {
    fn clone(&self) -> Self {
        match self {
            Command::Add {
                name,
                factory,
                addr,
            } => Command::Add {
                name: name.clone(),
                factory: factory.clone(),
                addr: *addr,
            },
        }
    }
}

pub struct Update<F> {
    cmd: Command<F>,
    result: OSender<Result<(), AnyError>>,
}

impl<F> Update<F> {
    pub fn new(cmd: Command<F>) -> (Self, OReceiver<Result<(), AnyError>>) {
        let (tx, rx) = ochannel();
        (Self { cmd, result: tx }, rx)
    }
}

pub struct WorkerController<F, S> {
    _marker: PhantomData<(F, S)>,
}

impl<F, S> Default for WorkerController<F, S> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F, S> WorkerController<F, S>
where
    F: MakeService<Service = S>,
    F::Error: Debug,
    S: Service<(TcpStream, PeerAddr)> + 'static,
    S::Error: Debug,
{
    pub async fn run_controller(&self, mut rx: Receiver<Update<F>>) {
        info!("worker controller started");
        while let Some(upd) = rx.next().await {
            if upd.result.send(self.execute(upd.cmd)).is_err() {
                error!("unable to send back result");
            }
        }
        info!("worker controller exit");
    }

    fn execute(&self, cmd: Command<F>) -> Result<(), AnyError> {
        match cmd {
            Command::Add {
                name,
                factory,
                addr,
            } => {
                let listener = match TcpListener::bind(addr) {
                    Ok(l) => l,
                    Err(e) => bail!("create listener fail for server {name}: {e}"),
                };
                let svc = match factory.make() {
                    Ok(svc) => svc,
                    Err(e) => bail!("create service fail for server {name}: {e:?}"),
                };
                info!("server {name} listening on {addr}");
                monoio::spawn(serve(listener, Rc::new(svc)));
                Ok(())
            }
        }
    }
}

pub async fn serve<S>(listener: TcpListener, handler: Rc<S>)
where
    S: Service<(TcpStream, PeerAddr)> + 'static,
    S::Error: Debug,
{
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let svc = handler.clone();
                monoio::spawn(async move {
                    match svc.call((stream, PeerAddr(addr))).await {
                        Ok(_) => info!("Connection {addr} complete"),
                        Err(e) => error!("Connection {addr} error: {e:?}"),
                    }
                });
            }
            Err(e) => warn!("Accept connection failed: {e:?}"),
        }
    }
}
