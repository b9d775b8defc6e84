//! Wallet client.
//!
//! Reads the ledger store directly and builds candidate transactions for an
//! HD wallet: transparent payments, coinbases, mints into the shielded pool
//! and pours out of it. Nothing here writes to the store; candidates go
//! through the validator.

use std::sync::Arc;

use log::debug;
use rand::rngs::OsRng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use dotcoin_config::ConsensusParams;
use dotcoin_keypair::{ExtendedKey, KeyError, Keypair, is_descendant};
use dotcoin_privacy::{
    Fr, NoteCommitmentTree, PrivacyError, ShieldedCoin, ShieldedKeyBundle, SpendingKey,
};
use dotcoin_prover::{OldCoinOpening, POUR_OUTPUTS, PourProof, ProofError, ProofService};
use dotcoin_pubkey::Address;
use dotcoin_transaction::{Output, PourDescription, Transaction, TransactionError, Utxo};

use crate::prover::ProvingService;
use crate::storage::{LedgerStore, SortDirection};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("payment amount must be positive")]
    InvalidAmount,
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Privacy(#[from] PrivacyError),
    #[error("cannot split a coin of value {value} to pay {amount}")]
    ValueSplit { amount: u64, value: u64 },
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error("ledger read failed: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Account balance in coins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    /// Unspent outputs of confirmed transactions
    pub usable: u64,
    /// Unspent outputs of transactions still in the pool
    pub pending: u64,
}

pub struct LedgerClient {
    keypair: Keypair,
    store: Arc<dyn LedgerStore>,
    params: ConsensusParams,
}

impl LedgerClient {
    pub fn new(keypair: Keypair, store: Arc<dyn LedgerStore>, params: ConsensusParams) -> Self {
        Self {
            keypair,
            store,
            params,
        }
    }

    pub fn from_seed(
        seed: &[u8],
        store: Arc<dyn LedgerStore>,
        params: ConsensusParams,
    ) -> Result<Self, ClientError> {
        Ok(Self::new(Keypair::from_seed(seed)?, store, params))
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Public receive-chain key of `account`; payers derive children from it.
    pub fn receiving_address(&self, account: u32) -> Result<Address, ClientError> {
        Ok(self.keypair.receive_key(account)?.address())
    }

    pub fn change_address(&self, account: u32) -> Result<Address, ClientError> {
        Ok(self.keypair.change_key(account)?.address())
    }

    pub fn shielded_keys(&self, account: u32) -> Result<ShieldedKeyBundle, ClientError> {
        let secret = self.keypair.shielded_secret(account)?;
        Ok(ShieldedKeyBundle::from_spending_key(SpendingKey::from_bytes(
            secret,
        )))
    }

    // =========================================================================
    // UTXO queries
    // =========================================================================

    /// Outputs held by children of `address` in confirmed (or, with
    /// `unconfirmed`, pending) transactions, optionally only the unspent ones.
    pub fn address_utxos(
        &self,
        address: &Address,
        unconfirmed: bool,
        usable_only: bool,
    ) -> Result<Vec<Utxo>, ClientError> {
        let transactions = self
            .store
            .get_transactions(0, 0, SortDirection::Descending, false)?;

        let mut utxos = Vec::new();
        for tx in transactions
            .iter()
            .filter(|tx| tx.is_confirmed() != unconfirmed)
        {
            for output in tx.transparent_outputs() {
                if !is_descendant(address, &output.address)? {
                    continue;
                }
                let Some(utxo) = self.store.get_utxo(&output.address)? else {
                    continue;
                };
                if usable_only && utxo.is_spent() {
                    continue;
                }
                utxos.push(utxo);
            }
        }
        Ok(utxos)
    }

    /// Confirmed then pending outputs of `address`.
    pub fn address_all_utxos(
        &self,
        address: &Address,
        usable_only: bool,
    ) -> Result<Vec<Utxo>, ClientError> {
        let mut utxos = self.address_utxos(address, false, usable_only)?;
        utxos.extend(self.address_utxos(address, true, usable_only)?);
        Ok(utxos)
    }

    /// Unspent outputs on the receive and change chains of `account`.
    pub fn account_utxos(&self, account: u32, unconfirmed: bool) -> Result<Vec<Utxo>, ClientError> {
        let mut utxos = self.address_utxos(&self.receiving_address(account)?, unconfirmed, true)?;
        utxos.extend(self.address_utxos(&self.change_address(account)?, unconfirmed, true)?);
        Ok(utxos)
    }

    pub fn balance(&self, account: u32) -> Result<Balance, ClientError> {
        let total = |utxos: Vec<Utxo>| utxos.iter().map(|u| u.amount).sum::<u64>();
        Ok(Balance {
            usable: total(self.account_utxos(account, false)?),
            pending: total(self.account_utxos(account, true)?),
        })
    }

    // =========================================================================
    // Transparent transactions
    // =========================================================================

    /// Pays `amount` to the next unused child of `recipient`, returning any
    /// change to the next unused child of the account's change chain.
    pub fn create_transaction(
        &self,
        account: u32,
        recipient: &Address,
        amount: u64,
    ) -> Result<Transaction, ClientError> {
        if amount == 0 {
            return Err(ClientError::InvalidAmount);
        }
        let (inputs, funded) = self.select_inputs(account, amount)?;

        let mut outputs = vec![Output::transparent(
            self.next_child(recipient)?,
            amount,
        )];
        if let Some(change) = self.change_output(account, funded - amount)? {
            outputs.push(change);
        }

        self.sign_and_seal(account, Transaction::new(inputs, outputs))
    }

    /// The block reward, paid to the next unused child of `address`.
    pub fn create_coinbase_transaction(
        &self,
        address: &Address,
    ) -> Result<Transaction, ClientError> {
        let output = Output::transparent(self.next_child(address)?, self.params.reward);
        let mut tx = Transaction::new(vec![], vec![output]);
        tx.signatures = Some(vec![]);
        Ok(tx.seal()?)
    }

    /// Smallest-first over every unspent output of the account, confirmed or
    /// pending, until `amount` is covered.
    fn select_inputs(&self, account: u32, amount: u64) -> Result<(Vec<Address>, u64), ClientError> {
        let mut candidates = self.account_utxos(account, false)?;
        candidates.extend(self.account_utxos(account, true)?);
        candidates.sort_by_key(|utxo| utxo.amount);

        let mut inputs = Vec::new();
        let mut funded = 0u64;
        for utxo in candidates {
            if funded >= amount {
                break;
            }
            funded = funded.saturating_add(utxo.amount);
            inputs.push(utxo.address);
        }

        if funded < amount {
            return Err(ClientError::InsufficientFunds {
                needed: amount,
                available: funded,
            });
        }
        debug!(
            "Selected {} inputs worth {funded} to cover {amount}",
            inputs.len()
        );
        Ok((inputs, funded))
    }

    /// Next unused child of `parent`; spent outputs still occupy their index.
    fn next_child(&self, parent: &Address) -> Result<Address, ClientError> {
        let used = self.address_all_utxos(parent, false)?;
        let parent = ExtendedKey::Public(parent.to_xpub().map_err(KeyError::from)?);
        let child = parent.next_available_child(used.iter().map(|utxo| &utxo.address))?;
        Ok(child.address())
    }

    fn change_output(&self, account: u32, change: u64) -> Result<Option<Output>, ClientError> {
        if change == 0 {
            return Ok(None);
        }
        let address = self.next_child(&self.change_address(account)?)?;
        Ok(Some(Output::transparent(address, change)))
    }

    fn sign_and_seal(&self, account: u32, mut tx: Transaction) -> Result<Transaction, ClientError> {
        let digest = tx.signing_digest()?;
        tx.signatures = Some(self.keypair.sign_inputs(account, &digest, &tx.inputs)?);
        Ok(tx.seal()?)
    }

    // =========================================================================
    // Shielded transactions
    // =========================================================================

    /// Moves `value` transparent coins into a fresh shielded coin for
    /// `recipient` (the account's own shielded key when `None`).
    pub fn create_mint_transaction(
        &self,
        account: u32,
        value: u64,
        recipient: Option<Fr>,
    ) -> Result<(Transaction, ShieldedCoin), ClientError> {
        let apk = match recipient {
            Some(apk) => apk,
            None => self.shielded_keys(account)?.public_key,
        };
        let (inputs, funded) = self.select_inputs(account, value)?;

        let coin = ShieldedCoin::new(value, apk, &mut OsRng);
        let mut outputs = vec![Output::shielded(coin.payload())];
        if let Some(change) = self.change_output(account, funded - value)? {
            outputs.push(change);
        }

        let tx = self.sign_and_seal(account, Transaction::new(inputs, outputs))?;
        Ok((tx, coin))
    }

    /// Spends `spent` into `amount` for `recipient_apk` and the remainder
    /// back to the account.
    pub fn create_pour_transaction(
        &self,
        account: u32,
        spent: &ShieldedCoin,
        recipient_apk: Fr,
        amount: u64,
        prover: &dyn ProofService,
    ) -> Result<(Transaction, [ShieldedCoin; POUR_OUTPUTS]), ClientError> {
        let (keys, opening, new_coins) = self.prepare_pour(account, spent, recipient_apk, amount)?;
        let proof = prover.build_proof(&keys.spending_key, &opening, new_coins.clone())?;
        let tx = finish_pour(proof, &new_coins)?;
        Ok((tx, new_coins))
    }

    /// [`Self::create_pour_transaction`] with the proof built on the
    /// background proving thread.
    pub async fn create_pour_transaction_async(
        &self,
        account: u32,
        spent: &ShieldedCoin,
        recipient_apk: Fr,
        amount: u64,
        proving: &ProvingService,
        cancel: Option<CancellationToken>,
    ) -> Result<(Transaction, [ShieldedCoin; POUR_OUTPUTS]), ClientError> {
        let (keys, opening, new_coins) = self.prepare_pour(account, spent, recipient_apk, amount)?;
        let proof = proving
            .prove(keys.spending_key, opening, new_coins.clone(), cancel)
            .await?;
        let tx = finish_pour(proof, &new_coins)?;
        Ok((tx, new_coins))
    }

    /// Membership witness for `spent` against the current tree, plus the two
    /// new coins.
    fn prepare_pour(
        &self,
        account: u32,
        spent: &ShieldedCoin,
        recipient_apk: Fr,
        amount: u64,
    ) -> Result<(ShieldedKeyBundle, OldCoinOpening, [ShieldedCoin; POUR_OUTPUTS]), ClientError> {
        if amount > spent.value {
            return Err(ClientError::ValueSplit {
                amount,
                value: spent.value,
            });
        }
        let keys = self.shielded_keys(account)?;

        let commitments = self.store.commitments()?;
        let tree = NoteCommitmentTree::from_commitments(&commitments)?;
        let membership = tree.prove_membership(&spent.commitment())?;

        let new_coins = [
            ShieldedCoin::new(amount, recipient_apk, &mut OsRng),
            ShieldedCoin::new(spent.value - amount, keys.public_key, &mut OsRng),
        ];
        let opening = OldCoinOpening {
            coin: spent.clone(),
            membership,
        };
        Ok((keys, opening, new_coins))
    }
}

fn finish_pour(
    proof: PourProof,
    new_coins: &[ShieldedCoin; POUR_OUTPUTS],
) -> Result<Transaction, ClientError> {
    let outputs = new_coins
        .iter()
        .map(|coin| Output::shielded(coin.payload()))
        .collect();

    let mut tx = Transaction::new(vec![], outputs);
    tx.signatures = Some(vec![]);
    tx.pour = Some(PourDescription {
        root: proof.public.root,
        nullifier: proof.public.nullifier,
        outputs: proof.public.outputs.to_vec(),
        proof: proof.proof,
    });
    Ok(tx.seal()?)
}
