//! Applies, validates, reverts and replays the contracts carried by blocks.

use anyhow::{Context as _, Result};
use covenant_types::{Block, ContractType, KeySource, Transaction};
use tracing::{debug, info, warn};

use crate::chain::{find_by_min_time, BlockRef, ChainIndex};
use crate::dispatcher::Dispatcher;
use crate::handler::{ContractContext, ResearcherHooks};
use crate::params::ReplayParams;

/// Protocol keys whose changes invalidate cached researcher identities.
pub const TEAM_WHITELIST_KEYS: [&str; 2] = ["REQUIRE_TEAM_WHITELIST_MEMBERSHIP", "TEAM_WHITELIST"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The replay window starts below the activation height.
    Skipped { start_height: u64 },
    Replayed {
        from_height: u64,
        blocks: usize,
        contracts: usize,
    },
}

/// Contract processing for the chain-state update path.
///
/// Callers must serialize access: every mutating entry point takes `&mut self`
/// and handler state is updated in place.
pub struct ContractPipeline {
    dispatcher: Dispatcher,
    keys: Box<dyn KeySource>,
    researchers: Box<dyn ResearcherHooks>,
    params: ReplayParams,
}

impl ContractPipeline {
    pub fn new(
        dispatcher: Dispatcher,
        keys: Box<dyn KeySource>,
        researchers: Box<dyn ResearcherHooks>,
        params: ReplayParams,
    ) -> Self {
        Self {
            dispatcher,
            keys,
            researchers,
            params,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn params(&self) -> &ReplayParams {
        &self.params
    }

    /// Apply the contracts of one transaction.
    ///
    /// Returns whether the transaction carried a registry contract (anything
    /// but a MESSAGE), in which case the block should be flagged for replay.
    pub fn apply_transaction(&mut self, tx: &Transaction, block: &BlockRef) -> bool {
        self.apply_contracts(tx, block).found
    }

    /// Apply every transaction of a block except the coinbase and coinstake.
    pub fn apply_block(&mut self, block: &Block, index: &BlockRef) -> bool {
        self.apply_block_contracts(block, index).found
    }

    fn apply_block_contracts(&mut self, block: &Block, index: &BlockRef) -> Applied {
        let mut applied = Applied::default();
        for tx in block.contract_transactions() {
            applied.merge(self.apply_contracts(tx, index));
        }
        applied
    }

    /// Contracts a handler fails on are logged and skipped.
    fn apply_contracts(&mut self, tx: &Transaction, block: &BlockRef) -> Applied {
        let mut applied = Applied::default();
        for contract in &tx.contracts {
            if contract.version == 1 && !contract.validate(self.keys.as_ref()) {
                debug!(height = block.height, "skipping invalid legacy contract");
                continue;
            }
            if contract.contract_type != ContractType::Message {
                applied.found = true;
            }
            if contract.contract_type == ContractType::Protocol
                && TEAM_WHITELIST_KEYS.contains(&contract.body.payload().legacy_key().as_str())
            {
                self.researchers.mark_dirty();
            }

            match self
                .dispatcher
                .apply(&ContractContext::new(contract, tx, block))
            {
                Ok(()) => applied.dispatched += 1,
                Err(err) => warn!(
                    height = block.height,
                    contract_type = %contract.contract_type,
                    ?err,
                    "failed to apply contract"
                ),
            }
        }
        applied
    }

    /// Stops at the first contract a handler rejects.
    pub fn validate_transaction(&self, tx: &Transaction) -> bool {
        tx.contracts
            .iter()
            .all(|contract| self.dispatcher.validate(contract, tx))
    }

    /// Undo the contracts of one transaction, last first.
    pub fn revert_transaction(&mut self, tx: &Transaction, block: &BlockRef) {
        for contract in tx.contracts.iter().rev() {
            if contract.version == 1 && !contract.verify_signature(self.keys.as_ref()) {
                continue;
            }
            if let Err(err) = self
                .dispatcher
                .revert(&ContractContext::new(contract, tx, block))
            {
                warn!(
                    height = block.height,
                    contract_type = %contract.contract_type,
                    ?err,
                    "failed to revert contract"
                );
            }
        }
    }

    /// Undo [Self::apply_block] for a disconnected block.
    pub fn revert_block(&mut self, block: &Block, index: &BlockRef) {
        for tx in block.contract_transactions().rev() {
            self.revert_transaction(tx, index);
        }
    }

    /// Rebuild handler state from every contract between the start of the
    /// window ending at `from` and the end of the chain.
    ///
    /// Blocks that cannot be read are logged and skipped.
    pub fn replay(&mut self, chain: &dyn ChainIndex, from: &BlockRef) -> Result<ReplayOutcome> {
        let min_time = from.time.saturating_sub(self.params.max_beacon_age_secs);
        let start = find_by_min_time(chain, from, min_time);
        if start.height < self.params.activation_height {
            debug!(
                start_height = start.height,
                activation_height = self.params.activation_height,
                "skipping contract replay"
            );
            return Ok(ReplayOutcome::Skipped {
                start_height: start.height,
            });
        }

        info!(
            start_height = start.height,
            from_height = from.height,
            "replaying contracts"
        );
        self.dispatcher
            .reset_handlers()
            .context("reset contract handlers")?;

        let mut blocks = 0;
        let mut contracts = 0;
        for index in (start.height..).map_while(|height| chain.at_height(height)) {
            let height = index.height;
            let activates_beacons = index.is_superblock
                && index.version >= self.params.superblock_min_version;
            if !index.has_contract && !activates_beacons {
                continue;
            }

            let block = match chain.read_block(&index) {
                Ok(block) => block,
                Err(err) => {
                    warn!(height, ?err, "unable to read block during contract replay");
                    continue;
                }
            };
            if index.has_contract {
                contracts += self.apply_block_contracts(&block, &index).dispatched;
                blocks += 1;
            }
            if activates_beacons {
                if let Some(superblock) = &block.superblock {
                    if let Err(err) = self
                        .dispatcher
                        .beacons_mut()
                        .activate_pending(&superblock.verified_beacons, block.time)
                    {
                        warn!(height, ?err, "failed to activate beacons");
                    }
                }
            }
        }

        self.researchers.refresh();
        info!(blocks, contracts, "replayed contracts");
        Ok(ReplayOutcome::Replayed {
            from_height: start.height,
            blocks,
            contracts,
        })
    }
}

/// Tally of one apply pass.
#[derive(Default)]
struct Applied {
    found: bool,
    dispatched: usize,
}

impl Applied {
    fn merge(&mut self, other: Applied) {
        self.found |= other.found;
        self.dispatched += other.dispatched;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Handlers;
    use crate::handler::SectionStore;
    use crate::mocks::{
        block_ref, create_keypair, protocol_tx, MemoryBeacons, MemoryChain, MemoryRegistry,
        MemorySections, ResearcherFlags,
    };
    use commonware_codec::Encode;
    use commonware_cryptography::Signer;
    use covenant_types::{
        keys::CONTRACT_NAMESPACE,
        make_legacy_contract,
        payloads::{BeaconPayload, MessagePayload},
        Contract, ContractAction, ContractSignature, LegacyPayload, NetworkKeys, Payload,
        Superblock,
    };

    struct Fixture {
        beacons: MemoryBeacons,
        polls: MemoryRegistry,
        whitelist: MemoryRegistry,
        sections: MemorySections,
        researchers: ResearcherFlags,
        pipeline: ContractPipeline,
    }

    impl Fixture {
        fn new(params: ReplayParams) -> Self {
            let beacons = MemoryBeacons::default();
            let polls = MemoryRegistry::default();
            let whitelist = MemoryRegistry::default();
            let sections = MemorySections::default();
            let researchers = ResearcherFlags::default();
            let dispatcher = Dispatcher::new(Handlers {
                beacons: Box::new(beacons.clone()),
                polls: Box::new(polls.clone()),
                whitelist: Box::new(whitelist.clone()),
                sections: Box::new(sections.clone()),
            });
            let pipeline = ContractPipeline::new(
                dispatcher,
                Box::new(NetworkKeys::default()),
                Box::new(researchers.clone()),
                params,
            );
            Self {
                beacons,
                polls,
                whitelist,
                sections,
                researchers,
                pipeline,
            }
        }

        fn state(&self) -> String {
            format!(
                "{:?}{:?}{:?}{:?}{:?}",
                self.beacons.pending(),
                self.beacons.active(),
                self.polls.snapshot(),
                self.whitelist.snapshot(),
                self.sections.snapshot()
            )
        }
    }

    fn replay_params() -> ReplayParams {
        ReplayParams {
            activation_height: 1,
            max_beacon_age_secs: 5_000,
            superblock_min_version: 11,
        }
    }

    fn beacon(cpid: &str, fill: u8) -> Contract {
        Contract::new(
            ContractType::Beacon,
            ContractAction::Add,
            Payload::Beacon(BeaconPayload {
                cpid: cpid.to_string(),
                public_key: vec![fill; 32],
            }),
        )
    }

    fn signed_vote(keys: &NetworkKeys) -> Contract {
        let mut vote = Contract::parse("<MT>vote</MT><MA>A</MA><MK>Poll;voter</MK><MV>yes</MV>");
        vote.sign_with_message_key(keys).unwrap();
        vote
    }

    /// Genesis at time 0, then contract-bearing blocks inside the replay window.
    fn history() -> MemoryChain {
        let keys = NetworkKeys::default();
        let mut chain = MemoryChain::default();
        chain.push_empty(0);
        chain.push(10_000, vec![protocol_tx(10_000, "k", "v1")], None);
        chain.push(
            10_100,
            vec![
                Transaction::new(10_100, vec![beacon("alpha", 1), beacon("beta", 2)]),
                Transaction::new(10_100, vec![signed_vote(&keys)]),
            ],
            None,
        );
        chain.push(
            10_200,
            vec![Transaction::new(
                10_200,
                vec![make_legacy_contract(
                    ContractType::Project,
                    ContractAction::Add,
                    "project",
                    "https://example.com/",
                )],
            )],
            None,
        );
        chain.push(
            10_300,
            Vec::new(),
            Some(Superblock {
                verified_beacons: vec!["alpha".to_string()],
            }),
        );
        chain.push(10_400, vec![protocol_tx(10_400, "k", "v2")], None);
        chain
    }

    /// A beacon contract the registry refuses to store.
    fn unstorable_beacon() -> Contract {
        Contract::new(
            ContractType::Beacon,
            ContractAction::Add,
            Payload::Legacy(LegacyPayload::new("gamma", "x")),
        )
    }

    #[test]
    fn test_team_whitelist_marks_researchers_dirty() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        let index = block_ref(10, 1_000);

        fixture.pipeline.apply_transaction(&protocol_tx(1_000, "OTHER", "x"), &index);
        assert!(!fixture.researchers.is_dirty());

        fixture.pipeline.apply_transaction(&protocol_tx(1_000, "TEAM_WHITELIST", "Team A"), &index);
        assert!(fixture.researchers.is_dirty());
        assert_eq!(
            fixture.sections.read("protocol", "TEAM_WHITELIST"),
            Some("Team A".to_string())
        );
    }

    #[test]
    fn test_require_membership_marks_researchers_dirty() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        fixture.pipeline.apply_transaction(
            &protocol_tx(1_000, "REQUIRE_TEAM_WHITELIST_MEMBERSHIP", "true"),
            &block_ref(10, 1_000),
        );
        assert!(fixture.researchers.is_dirty());
    }

    #[test]
    fn test_apply_skips_invalid_legacy_contracts() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        let unsigned = Contract::parse("<MT>protocol</MT><MA>A</MA><MK>k</MK><MV>v</MV>");
        let tx = Transaction::new(1_000, vec![unsigned]);

        let found = fixture.pipeline.apply_transaction(&tx, &block_ref(10, 1_000));
        assert!(!found);
        assert!(fixture.sections.snapshot().is_empty());
    }

    #[test]
    fn test_apply_reports_found_contracts() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        let index = block_ref(10, 1_000);
        let message = Contract::new(
            ContractType::Message,
            ContractAction::Add,
            Payload::Message(MessagePayload {
                message: "memo".to_string(),
            }),
        );

        let found = fixture
            .pipeline
            .apply_transaction(&Transaction::new(1_000, vec![message.clone()]), &index);
        assert!(!found);

        let found = fixture.pipeline.apply_transaction(
            &Transaction::new(1_000, vec![message, signed_vote(&NetworkKeys::default())]),
            &index,
        );
        assert!(found);
        assert_eq!(fixture.polls.snapshot().len(), 1);
    }

    #[test]
    fn test_apply_block_skips_coinbase_and_coinstake() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        let parent = block_ref(0, 0).hash;
        let block = Block::new(
            parent,
            1_000,
            11,
            vec![
                protocol_tx(1_000, "coinbase", "x"),
                protocol_tx(1_000, "coinstake", "x"),
                protocol_tx(1_000, "user", "x"),
            ],
            None,
        );
        let index = BlockRef::new(1, &block);

        assert!(fixture.pipeline.apply_block(&block, &index));
        assert_eq!(fixture.sections.snapshot().len(), 1);
        assert_eq!(fixture.sections.read("protocol", "user"), Some("x".to_string()));
    }

    #[test]
    fn test_revert_block_restores_state() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        let chain = history();
        let tip = chain.tip().unwrap();
        let setup = chain.at_height(1).unwrap();
        fixture.pipeline.apply_block(chain.block(&setup), &setup);

        // The tip overwrites an existing protocol entry, which a symmetric
        // revert cannot restore.
        for height in 2..tip.height {
            let index = chain.at_height(height).unwrap();
            let block = chain.block(&index);
            let before = fixture.state();

            fixture.pipeline.apply_block(block, &index);
            if index.has_contract {
                assert_ne!(fixture.state(), before, "height {height}");
            }
            fixture.pipeline.revert_block(block, &index);
            assert_eq!(fixture.state(), before, "height {height}");
        }
    }

    #[test]
    fn test_revert_skips_forged_legacy_contracts() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        let index = block_ref(10, 1_000);
        let keys = NetworkKeys::default();
        let vote = signed_vote(&keys);
        fixture.pipeline.apply_transaction(&Transaction::new(1_000, vec![vote.clone()]), &index);

        let mut forged = vote.clone();
        let (unrelated, _) = create_keypair(42);
        let signature = unrelated.sign(CONTRACT_NAMESPACE, forged.hash().as_ref());
        forged.signature = ContractSignature::new(signature.encode().to_vec());
        fixture.pipeline.revert_transaction(&Transaction::new(1_000, vec![forged]), &index);
        assert_eq!(fixture.polls.snapshot().len(), 1);

        fixture.pipeline.revert_transaction(&Transaction::new(1_000, vec![vote]), &index);
        assert!(fixture.polls.snapshot().is_empty());
    }

    #[test]
    fn test_validate_transaction_fails_fast() {
        let fixture = Fixture::new(ReplayParams::testnet());
        fixture.whitelist.reject("blocked");
        let project = |key: &str| {
            make_legacy_contract(ContractType::Project, ContractAction::Add, key, "url")
        };

        let tx = Transaction::new(1_000, vec![project("a"), project("b")]);
        assert!(fixture.pipeline.validate_transaction(&tx));

        let tx = Transaction::new(1_000, vec![project("a"), project("blocked"), project("c")]);
        assert!(!fixture.pipeline.validate_transaction(&tx));
    }

    #[test]
    fn test_replay_below_activation_height_is_noop() {
        let mut fixture = Fixture::new(ReplayParams::mainnet());
        let chain = history();
        let tip = chain.tip().unwrap();
        fixture.pipeline.apply_transaction(&protocol_tx(1_000, "k", "live"), &block_ref(3, 1_000));

        let outcome = fixture.pipeline.replay(&chain, &tip).unwrap();
        assert!(matches!(outcome, ReplayOutcome::Skipped { .. }));
        assert_eq!(fixture.beacons.resets(), 0);
        assert_eq!(chain.reads(), 0);
        assert_eq!(fixture.researchers.refreshes(), 0);
        assert_eq!(fixture.sections.read("protocol", "k"), Some("live".to_string()));
    }

    #[test]
    fn test_replay_rebuilds_state() {
        let mut fixture = Fixture::new(replay_params());
        let chain = history();
        let tip = chain.tip().unwrap();
        fixture.pipeline.apply_transaction(&protocol_tx(1, "stale", "x"), &block_ref(1, 1));

        let outcome = fixture.pipeline.replay(&chain, &tip).unwrap();
        assert_eq!(
            outcome,
            ReplayOutcome::Replayed {
                from_height: 1,
                blocks: 4,
                contracts: 6,
            }
        );
        assert_eq!(fixture.beacons.resets(), 1);
        assert_eq!(fixture.researchers.refreshes(), 1);
        assert_eq!(fixture.sections.read("protocol", "stale"), None);
        assert_eq!(fixture.sections.read("protocol", "k"), Some("v2".to_string()));
        assert!(fixture.beacons.active().contains_key("alpha"));
        assert_eq!(fixture.beacons.active()["alpha"].timestamp, 10_300);
        assert!(fixture.beacons.pending().contains_key("beta"));
        assert_eq!(fixture.polls.snapshot().len(), 1);
        assert_eq!(fixture.whitelist.snapshot().len(), 1);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let chain = history();
        let tip = chain.tip().unwrap();

        let mut first = Fixture::new(replay_params());
        let mut second = Fixture::new(replay_params());
        second.pipeline.apply_transaction(&protocol_tx(5, "noise", "x"), &block_ref(1, 5));

        first.pipeline.replay(&chain, &tip).unwrap();
        second.pipeline.replay(&chain, &tip).unwrap();
        assert_eq!(first.state(), second.state());

        first.pipeline.replay(&chain, &tip).unwrap();
        assert_eq!(first.state(), second.state());
    }

    #[test]
    fn test_replay_ignores_old_superblocks() {
        let mut fixture = Fixture::new(ReplayParams {
            superblock_min_version: 12,
            ..replay_params()
        });
        let chain = history();
        fixture.pipeline.replay(&chain, &chain.tip().unwrap()).unwrap();
        assert!(fixture.beacons.active().is_empty());
        assert_eq!(fixture.beacons.pending().len(), 2);
    }

    #[test]
    fn test_replay_skips_unreadable_blocks() {
        let mut fixture = Fixture::new(replay_params());
        let mut chain = history();
        chain.corrupt(3);

        let outcome = fixture.pipeline.replay(&chain, &chain.tip().unwrap()).unwrap();
        assert!(matches!(outcome, ReplayOutcome::Replayed { blocks: 3, .. }));
        assert!(fixture.whitelist.snapshot().is_empty());
        assert_eq!(fixture.sections.read("protocol", "k"), Some("v2".to_string()));
    }

    #[test]
    fn test_replay_window_excludes_old_blocks() {
        let mut fixture = Fixture::new(ReplayParams {
            max_beacon_age_secs: 150,
            ..replay_params()
        });
        let chain = history();
        let outcome = fixture.pipeline.replay(&chain, &chain.tip().unwrap()).unwrap();
        assert_eq!(
            outcome,
            ReplayOutcome::Replayed {
                from_height: 4,
                blocks: 1,
                contracts: 1,
            }
        );
        assert!(fixture.beacons.pending().is_empty());
    }

    #[test]
    fn test_apply_continues_past_handler_failure() {
        let mut fixture = Fixture::new(ReplayParams::testnet());
        let index = block_ref(10, 1_000);
        let protocol = |key: &str| {
            make_legacy_contract(ContractType::Protocol, ContractAction::Add, key, "x")
        };
        let block = Block::new(
            index.hash,
            1_000,
            11,
            vec![
                protocol_tx(1_000, "coinbase", "x"),
                protocol_tx(1_000, "coinstake", "x"),
                protocol_tx(1_000, "first", "x"),
                Transaction::new(
                    1_000,
                    vec![protocol("same"), unstorable_beacon(), protocol("same_tx")],
                ),
                protocol_tx(1_000, "after", "x"),
            ],
            None,
        );

        assert!(fixture.pipeline.apply_block(&block, &index));
        for key in ["first", "same", "same_tx", "after"] {
            assert_eq!(fixture.sections.read("protocol", key), Some("x".to_string()), "{key}");
        }
        assert!(fixture.beacons.pending().is_empty());

        fixture.pipeline.revert_block(&block, &index);
        assert!(fixture.sections.snapshot().is_empty());
    }

    #[test]
    fn test_replay_counts_only_dispatched_contracts() {
        let mut fixture = Fixture::new(replay_params());
        let mut chain = history();
        let unsigned = Contract::parse("<MT>protocol</MT><MA>A</MA><MK>u</MK><MV>v</MV>");
        chain.push(
            10_500,
            vec![Transaction::new(
                10_500,
                vec![unsigned, unstorable_beacon(), beacon("delta", 4)],
            )],
            None,
        );

        let outcome = fixture.pipeline.replay(&chain, &chain.tip().unwrap()).unwrap();
        assert_eq!(
            outcome,
            ReplayOutcome::Replayed {
                from_height: 1,
                blocks: 5,
                contracts: 7,
            }
        );
        assert_eq!(fixture.researchers.refreshes(), 1);
        assert!(fixture.beacons.pending().contains_key("delta"));
        assert_eq!(fixture.sections.read("protocol", "u"), None);
    }

    #[test]
    fn test_replay_from_inner_block_runs_to_chain_end() {
        let mut fixture = Fixture::new(replay_params());
        let chain = history();
        let from = chain.at_height(3).unwrap();

        let outcome = fixture.pipeline.replay(&chain, &from).unwrap();
        assert_eq!(
            outcome,
            ReplayOutcome::Replayed {
                from_height: 1,
                blocks: 4,
                contracts: 6,
            }
        );
        assert_eq!(fixture.sections.read("protocol", "k"), Some("v2".to_string()));
        assert!(fixture.beacons.active().contains_key("alpha"));
    }
}
