use std::{collections::HashMap, path::Path, sync::Mutex};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use eyre::{eyre, Result};
use xchat_addresses::{ChainInfo, ContractsRegistry, Deployment, RunOutput};
use xchat_deploy::{
    backend::{ChatMessage, HubSpokeBackend},
    commands::{run, Command, DeployTarget, HubAction, SpokeAction},
    constants::{DEFAULT_MESSAGE_VALUE, DEPLOY_HUB_AND_SPOKES, DEPLOY_INDIVIDUAL_CONTRACT},
    deploy::deploy_hub_and_spokes,
    env::Environment,
    relayer::{DeliveryInfo, DeliveryStatus, RedeliveryRequest, RelayRequest},
    Error,
};

const CHAINS: &str = r#"{
    "chains": [
        {
            "evmNetworkId": 5,
            "chainId": 2,
            "rpc": "http://localhost:8545",
            "wormholeAddress": "0x706abc4E45D419950511e474C7B9Ed348A4a716c",
            "coreRelayerAddress": "0x9a4d7A3cB1f5B62a5Bd5E11F5C33e5d1F0c4ce3e",
            "description": "Goerli"
        },
        {
            "evmNetworkId": 97,
            "chainId": 4,
            "rpc": "http://localhost:8546",
            "wormholeAddress": "0x68605AD7b15c732a30b1BbC62BE8F2A509D74b4D",
            "coreRelayerAddress": "0x3c6F9E8e4bB9B0d0e5C3b16f1C8Ba1f8D2bC3A71",
            "description": "BSC testnet"
        }
    ]
}"#;

/// Everything the in-memory chains have seen.
#[derive(Default)]
struct State {
    next_address: u64,
    next_tx: u64,
    registered: HashMap<u16, H256>,
    messages: HashMap<Address, Vec<ChatMessage>>,
    sent_values: Vec<U256>,
    deliveries: HashMap<H256, Vec<DeliveryInfo>>,
    resends: Vec<RedeliveryRequest>,
    confirmed: Vec<(u16, H256)>,
}

impl State {
    fn tx_hash(&mut self) -> H256 {
        self.next_tx += 1;
        H256::from_low_u64_be(self.next_tx)
    }

    fn address(&mut self) -> Address {
        self.next_address += 1;
        Address::from_low_u64_be(0x1000 + self.next_address)
    }
}

/// A backend that keeps contracts in memory instead of talking to chains.
#[derive(Default)]
struct MockBackend {
    state: Mutex<State>,
    fail_sends: bool,
    fail_confirmations: bool,
}

impl MockBackend {
    fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Default::default()
        }
    }

    fn reverting() -> Self {
        Self {
            fail_confirmations: true,
            ..Default::default()
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl HubSpokeBackend for MockBackend {
    async fn deploy_hub(&self, chain: &ChainInfo) -> Result<Deployment> {
        Ok(Deployment {
            chain_id: chain.chain_id,
            address: self.state().address(),
        })
    }

    async fn deploy_spoke(&self, chain: &ChainInfo, _hub: &Deployment) -> Result<Deployment> {
        Ok(Deployment {
            chain_id: chain.chain_id,
            address: self.state().address(),
        })
    }

    async fn register_spoke(&self, _hub: &Deployment, spoke: &Deployment) -> Result<H256> {
        let mut state = self.state();
        state
            .registered
            .insert(spoke.chain_id, spoke.universal_address());
        Ok(state.tx_hash())
    }

    async fn registered_emitter(&self, _hub: &Deployment, chain_id: u16) -> Result<H256> {
        Ok(self
            .state()
            .registered
            .get(&chain_id)
            .copied()
            .unwrap_or_default())
    }

    async fn get_messages(&self, spoke: &Deployment) -> Result<Vec<ChatMessage>> {
        Ok(self
            .state()
            .messages
            .get(&spoke.address)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        spoke: &Deployment,
        message: Bytes,
        value: U256,
    ) -> Result<H256> {
        if self.fail_sends {
            return Err(eyre!("insufficient funds for gas * price + value"));
        }
        let mut state = self.state();
        let sender = Address::from_low_u64_be(0xbeef);
        state
            .messages
            .entry(spoke.address)
            .or_default()
            .push(ChatMessage { sender, message });
        state.sent_values.push(value);
        let tx_hash = state.tx_hash();
        let sequence = state.next_tx;
        state.deliveries.insert(
            tx_hash,
            vec![DeliveryInfo {
                request: RelayRequest {
                    sequence,
                    nonce: 0,
                    delivery_index: 1,
                },
                status: DeliveryStatus::Pending,
                target_tx_hash: None,
            }],
        );
        Ok(tx_hash)
    }

    async fn wait_for_transaction(&self, chain_id: u16, tx_hash: H256) -> Result<()> {
        if self.fail_confirmations {
            return Err(eyre!("pending transaction {:?} reverted", tx_hash));
        }
        self.state().confirmed.push((chain_id, tx_hash));
        Ok(())
    }

    async fn delivery_status(
        &self,
        _source: &ChainInfo,
        _target: &ChainInfo,
        tx_hash: H256,
    ) -> Result<Vec<DeliveryInfo>> {
        Ok(self
            .state()
            .deliveries
            .get(&tx_hash)
            .cloned()
            .unwrap_or_default())
    }

    async fn resend(&self, _source: &ChainInfo, request: RedeliveryRequest) -> Result<H256> {
        let mut state = self.state();
        state.resends.push(request);
        Ok(state.tx_hash())
    }
}

fn write(root: &Path, relative: &str, contents: &str) -> Result<()> {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap())?;
    std::fs::write(path, contents)?;
    Ok(())
}

fn setup() -> Result<(tempfile::TempDir, Environment)> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "testnet/chains.json", CHAINS)?;
    write(dir.path(), "config/testnet/contracts.json", "{}")?;
    let env = Environment::new("testnet", dir.path());
    Ok((dir, env))
}

async fn exec(command: Command, env: &Environment, backend: &MockBackend) -> Result<String> {
    let mut out = Vec::new();
    run(command, env, backend, &mut out).await?;
    Ok(String::from_utf8(out)?)
}

fn spoke(chain_id: u16, action: SpokeAction) -> Command {
    Command::Spoke { chain_id, action }
}

async fn deploy_hub_and_spoke(env: &Environment, backend: &MockBackend) -> Result<()> {
    exec(
        Command::Deploy {
            target: DeployTarget::Hub { chain_id: 2 },
        },
        env,
        backend,
    )
    .await?;
    exec(
        Command::Deploy {
            target: DeployTarget::Spoke { chain_id: 4 },
        },
        env,
        backend,
    )
    .await?;
    exec(spoke(4, SpokeAction::Register), env, backend).await?;
    Ok(())
}

#[tokio::test]
async fn test_deploy_register_info() -> Result<()> {
    let (_dir, env) = setup()?;
    let backend = MockBackend::default();

    // Before anything is deployed there is no hub.
    let info = exec(Command::Info, &env, &backend).await?;
    assert!(info.contains("Current Hub: none"));

    // Deploy the hub and check that it was recorded.
    let out = exec(
        Command::Deploy {
            target: DeployTarget::Hub { chain_id: 2 },
        },
        &env,
        &backend,
    )
    .await?;
    assert!(out.starts_with("Deploying Hub to chain 2...\n"));
    assert!(out.contains("(chain 2)"));
    let hub = env.load_hub()?;
    assert_eq!(hub.chain_id, 2);

    // Deploy a spoke that points at the hub and register it.
    let out = exec(
        Command::Deploy {
            target: DeployTarget::Spoke { chain_id: 4 },
        },
        &env,
        &backend,
    )
    .await?;
    assert!(out.contains("Spoke deployed to"));
    let out = exec(spoke(4, SpokeAction::Register), &env, &backend).await?;
    assert!(out.contains("Sent registration message!"));
    assert!(out.ends_with("Message confirmed!\n"));
    let spoke = env.spoke(4)?;
    assert_eq!(
        backend.state().registered.get(&4),
        Some(&spoke.universal_address())
    );

    // Info lists the chains, the hub and the spoke.
    let info = exec(Command::Info, &env, &backend).await?;
    assert_eq!(
        info,
        "Current chains: \n(2): Goerli\n(4): BSC testnet\nCurrent Hub: 2\nCurrent Spokes: 4\n"
    );

    // Both deployments were written to the individual contract output.
    let last_run = serde_json::from_slice::<RunOutput>(&std::fs::read(
        env.last_run_path(DEPLOY_INDIVIDUAL_CONTRACT),
    )?)?;
    assert_eq!(last_run, RunOutput::Spoke { spoke });
    Ok(())
}

#[tokio::test]
async fn test_redeploying_a_spoke_replaces_it() -> Result<()> {
    let (_dir, env) = setup()?;
    let backend = MockBackend::default();
    deploy_hub_and_spoke(&env, &backend).await?;
    let first = env.spoke(4)?;

    exec(
        Command::Deploy {
            target: DeployTarget::Spoke { chain_id: 4 },
        },
        &env,
        &backend,
    )
    .await?;
    let spokes = env.load_spokes()?;
    assert_eq!(spokes.len(), 1);
    assert_ne!(spokes[0], first);
    Ok(())
}

#[tokio::test]
async fn test_send_and_get_messages() -> Result<()> {
    let (_dir, env) = setup()?;
    let backend = MockBackend::default();
    deploy_hub_and_spoke(&env, &backend).await?;

    for text in ["gm", "hello hub", "bye"] {
        let out = exec(
            spoke(
                4,
                SpokeAction::SendMessage {
                    text: text.to_string(),
                    value: None,
                },
            ),
            &env,
            &backend,
        )
        .await?;
        assert!(out.starts_with("Sent message!"));
        assert!(out.ends_with("Message confirmed!\n"));
    }
    // Each message is confirmed on the spoke's chain.
    let confirmed = backend.state().confirmed.clone();
    assert_eq!(confirmed.len(), 4);
    assert!(confirmed[1..].iter().all(|(chain_id, _)| *chain_id == 4));
    assert_eq!(
        backend.state().sent_values,
        vec![*DEFAULT_MESSAGE_VALUE; 3]
    );
    assert_eq!(*DEFAULT_MESSAGE_VALUE, U256::from(200_000_000_000_000_000u64));

    // An explicit value is passed through.
    exec(
        spoke(
            4,
            SpokeAction::SendMessage {
                text: "rich".to_string(),
                value: Some(U256::from(7)),
            },
        ),
        &env,
        &backend,
    )
    .await?;
    assert_eq!(backend.state().sent_values.last(), Some(&U256::from(7)));

    let all = exec(spoke(4, SpokeAction::GetMessages { count: None }), &env, &backend).await?;
    assert_eq!(all.lines().count(), 4);
    assert!(all.lines().all(|l| l.starts_with("Sender 0x")));
    assert!(all.lines().next().unwrap().ends_with(": gm"));

    let last_two = exec(
        spoke(4, SpokeAction::GetMessages { count: Some(2) }),
        &env,
        &backend,
    )
    .await?;
    let lines = last_two.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(": bye"));
    assert!(lines[1].ends_with(": rich"));

    // Asking for more messages than there are prints all of them.
    let more = exec(
        spoke(4, SpokeAction::GetMessages { count: Some(10) }),
        &env,
        &backend,
    )
    .await?;
    assert_eq!(more, all);

    // A count of zero prints every message too.
    let zero = exec(
        spoke(4, SpokeAction::GetMessages { count: Some(0) }),
        &env,
        &backend,
    )
    .await?;
    assert_eq!(zero, all);
    Ok(())
}

#[tokio::test]
async fn test_status_and_resend() -> Result<()> {
    let (_dir, env) = setup()?;
    let backend = MockBackend::default();
    deploy_hub_and_spoke(&env, &backend).await?;

    // An unknown transaction has no deliveries.
    let unknown = H256::from_low_u64_be(0xdead);
    let out = exec(spoke(4, SpokeAction::Status { tx_hash: unknown }), &env, &backend).await?;
    assert_eq!(out, "not found\n");

    // A sent message has a pending delivery.
    exec(
        spoke(
            4,
            SpokeAction::SendMessage {
                text: "gm".to_string(),
                value: None,
            },
        ),
        &env,
        &backend,
    )
    .await?;
    let tx_hash = H256::from_low_u64_be(backend.state().next_tx);
    let out = exec(spoke(4, SpokeAction::Status { tx_hash }), &env, &backend).await?;
    assert!(out.contains("pending"));

    // Resending builds a redelivery request from the relay request.
    let out = exec(
        spoke(
            4,
            SpokeAction::Resend {
                tx_hash,
                value: None,
            },
        ),
        &env,
        &backend,
    )
    .await?;
    assert!(out.starts_with("Redelivery requested!"));
    let resends = backend.state().resends.clone();
    assert_eq!(
        resends,
        vec![RedeliveryRequest {
            source_chain: 4,
            source_tx_hash: tx_hash,
            source_nonce: 0,
            target_chain: 2,
            delivery_index: 1,
            new_fee: *DEFAULT_MESSAGE_VALUE,
        }]
    );

    // A transaction without relay requests can't be resent.
    let result = run(
        spoke(
            4,
            SpokeAction::Resend {
                tx_hash: unknown,
                value: None,
            },
        ),
        &env,
        &backend,
        &mut Vec::new(),
    )
    .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_hub_state() -> Result<()> {
    let (dir, env) = setup()?;
    let backend = MockBackend::default();
    deploy_hub_and_spoke(&env, &backend).await?;

    // Add a spoke on the hub chain that was never registered.
    let mut registry = env.load_registry()?;
    registry.spokes.push(Deployment {
        chain_id: 2,
        address: Address::from_low_u64_be(0x42),
    });
    write(
        dir.path(),
        "config/testnet/contracts.json",
        &serde_json::to_string(&registry)?,
    )?;

    let out = exec(
        Command::Hub {
            action: HubAction::State,
        },
        &env,
        &backend,
    )
    .await?;
    let lines = out.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Hub 0x"));
    assert!(lines[1].starts_with("(4): registered 0x"));
    assert_eq!(lines[2], "(2): not registered");
    Ok(())
}

#[tokio::test]
async fn test_command_errors() -> Result<()> {
    let (_dir, env) = setup()?;
    let backend = MockBackend::default();

    // Unknown chains.
    let result = run(
        Command::Deploy {
            target: DeployTarget::Hub { chain_id: 6 },
        },
        &env,
        &backend,
        &mut Vec::new(),
    )
    .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    // A spoke can't be deployed before the hub.
    let result = run(
        Command::Deploy {
            target: DeployTarget::Spoke { chain_id: 4 },
        },
        &env,
        &backend,
        &mut Vec::new(),
    )
    .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    // Spoke commands need a deployed spoke.
    let result = run(
        spoke(4, SpokeAction::GetMessages { count: None }),
        &env,
        &backend,
        &mut Vec::new(),
    )
    .await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.exit_code(), 3);
    Ok(())
}

#[tokio::test]
async fn test_chain_failures_are_reported() -> Result<()> {
    let (_dir, env) = setup()?;
    let backend = MockBackend::failing();
    deploy_hub_and_spoke(&env, &backend).await?;

    let result = run(
        spoke(
            4,
            SpokeAction::SendMessage {
                text: "gm".to_string(),
                value: None,
            },
        ),
        &env,
        &backend,
        &mut Vec::new(),
    )
    .await;
    match result {
        Err(Error::ChainInteraction(msg)) => assert!(msg.contains("insufficient funds")),
        other => panic!("unexpected result: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_hash_is_printed_before_confirmation() -> Result<()> {
    let (_dir, env) = setup()?;
    let backend = MockBackend::reverting();
    exec(
        Command::Deploy {
            target: DeployTarget::Hub { chain_id: 2 },
        },
        &env,
        &backend,
    )
    .await?;
    exec(
        Command::Deploy {
            target: DeployTarget::Spoke { chain_id: 4 },
        },
        &env,
        &backend,
    )
    .await?;

    let mut out = Vec::new();
    let result = run(
        spoke(
            4,
            SpokeAction::SendMessage {
                text: "gm".to_string(),
                value: None,
            },
        ),
        &env,
        &backend,
        &mut out,
    )
    .await;
    match result {
        Err(Error::ChainInteraction(msg)) => assert!(msg.contains("reverted")),
        other => panic!("unexpected result: {:?}", other),
    }
    let out = String::from_utf8(out)?;
    assert!(out.starts_with("Sent message! (0x"));
    assert!(!out.contains("Message confirmed!"));

    let mut out = Vec::new();
    let result = run(spoke(4, SpokeAction::Register), &env, &backend, &mut out).await;
    assert!(matches!(result, Err(Error::ChainInteraction(_))));
    assert!(String::from_utf8(out)?.starts_with("Sent registration message!"));
    Ok(())
}

#[tokio::test]
async fn test_deploy_hub_and_spokes() -> Result<()> {
    let (dir, env) = setup()?;
    let backend = MockBackend::default();

    let output = deploy_hub_and_spokes(&env, &backend).await?;
    let (hub, spokes) = match &output {
        RunOutput::HubAndSpokes { hub, spokes } => (*hub, spokes.clone()),
        other => panic!("unexpected output: {:?}", other),
    };
    assert_eq!(hub.chain_id, 2);
    assert_eq!(
        spokes.iter().map(|s| s.chain_id).collect::<Vec<_>>(),
        vec![2, 4]
    );
    assert_eq!(backend.state().registered.len(), 2);
    assert_eq!(backend.state().confirmed.len(), 2);

    // The contracts file is left alone until it opts into the last run.
    assert_eq!(env.load_registry()?, ContractsRegistry::default());
    assert!(matches!(env.load_hub(), Err(Error::NotFound(_))));
    write(
        dir.path(),
        "config/testnet/contracts.json",
        r#"{ "useLastRun": true }"#,
    )?;
    assert_eq!(env.load_hub()?, hub);
    assert_eq!(env.load_spokes()?, spokes);

    let last_run = serde_json::from_slice::<RunOutput>(&std::fs::read(
        env.last_run_path(DEPLOY_HUB_AND_SPOKES),
    )?)?;
    assert_eq!(last_run, output);
    Ok(())
}
