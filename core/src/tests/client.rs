use dotcoin_keypair::{KeyError, is_descendant};

use super::{Node, params};
use crate::client::{Balance, ClientError};

fn balance(usable: u64, pending: u64) -> Balance {
    Balance { usable, pending }
}

/// Two wallets trade coins across three blocks.
fn run_balance_flow(node: &Node) {
    let client1 = node.client(1);
    let client2 = node.client(2);

    node.mine_and_submit(&client1, 0);
    assert_eq!(client1.balance(0).unwrap(), balance(100, 0));
    assert_eq!(client2.balance(0).unwrap(), balance(0, 0));

    let to_client2 = client2.receiving_address(0).unwrap();
    let tx = client1.create_transaction(0, &to_client2, 10).unwrap();
    node.validator.add_transaction(tx).unwrap();
    assert_eq!(client1.balance(0).unwrap(), balance(0, 90));
    assert_eq!(client2.balance(0).unwrap(), balance(0, 10));

    let mined = node.mine_and_submit(&client2, 0);
    assert_eq!(mined.transactions.len(), 1);
    assert_eq!(client1.balance(0).unwrap(), balance(90, 0));
    assert_eq!(client2.balance(0).unwrap(), balance(110, 0));

    let to_client1 = client1.receiving_address(0).unwrap();
    let tx = client2.create_transaction(0, &to_client1, 30).unwrap();
    node.validator.add_transaction(tx).unwrap();
    assert_eq!(client1.balance(0).unwrap(), balance(90, 30));
    assert_eq!(client2.balance(0).unwrap(), balance(0, 80));

    node.mine_and_submit(&client1, 0);
    assert_eq!(client1.balance(0).unwrap(), balance(220, 0));
    assert_eq!(client2.balance(0).unwrap(), balance(80, 0));
}

#[test]
fn test_balance_flow_in_memory() {
    run_balance_flow(&Node::memory(params(2)));
}

#[test]
fn test_balance_flow_on_rocksdb() {
    run_balance_flow(&Node::rocksdb(params(1)));
}

#[test]
fn test_pending_change_is_spendable() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    node.mine_and_submit(&client1, 0);
    let first = client1.create_transaction(0, &to_client2, 10).unwrap();
    node.validator.add_transaction(first).unwrap();

    // Only the pending change of 90 is left to fund this one
    let second = client1.create_transaction(0, &to_client2, 50).unwrap();
    assert_eq!(second.inputs.len(), 1);
    node.validator.add_transaction(second).unwrap();
    assert_eq!(client1.balance(0).unwrap(), balance(0, 40));
}

#[test]
fn test_inputs_selected_smallest_first() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    node.mine_and_submit(&client1, 0);
    node.mine_and_submit(&client1, 0);
    let tx = client1.create_transaction(0, &to_client2, 150).unwrap();
    node.validator.add_transaction(tx.clone()).unwrap();

    assert_eq!(tx.inputs.len(), 2);
    let change: u64 = tx
        .transparent_outputs()
        .filter(|output| {
            is_descendant(&client1.change_address(0).unwrap(), &output.address).unwrap()
        })
        .map(|output| output.amount)
        .sum();
    assert_eq!(change, 50);
}

#[test]
fn test_exact_amount_has_no_change_output() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    node.mine_and_submit(&client1, 0);
    let tx = client1.create_transaction(0, &to_client2, 100).unwrap();
    assert_eq!(tx.outputs.len(), 1);
    node.validator.add_transaction(tx).unwrap();
}

#[test]
fn test_insufficient_funds() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    node.mine_and_submit(&client1, 0);
    let err = client1
        .create_transaction(0, &to_client2, 101)
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::InsufficientFunds {
            needed: 101,
            available: 100
        }
    ));
}

#[test]
fn test_zero_amount_is_rejected() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    node.mine_and_submit(&client1, 0);
    let err = client1.create_transaction(0, &to_client2, 0).unwrap_err();
    assert!(matches!(err, ClientError::InvalidAmount));
    assert_eq!(client1.balance(0).unwrap().usable, 100);
}

#[test]
fn test_accounts_are_separate() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    node.mine_and_submit(&client1, 1);
    assert_eq!(client1.balance(1).unwrap(), balance(100, 0));
    assert_eq!(client1.balance(0).unwrap(), balance(0, 0));
    assert!(matches!(
        client1.create_transaction(0, &to_client2, 1),
        Err(ClientError::InsufficientFunds { .. })
    ));
}

#[test]
fn test_coinbase_skips_spent_children() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    let first = node.mine_and_submit(&client1, 0);
    let tx = client1.create_transaction(0, &to_client2, 100).unwrap();
    node.validator.add_transaction(tx).unwrap();

    // The first coinbase output is spent, its index stays taken
    let second = node.mine_and_submit(&client1, 0);
    let first_address = &first.coinbase.transparent_outputs().next().unwrap().address;
    let second_address = &second.coinbase.transparent_outputs().next().unwrap().address;
    assert_eq!(first_address.child_index().unwrap(), 0);
    assert_eq!(second_address.child_index().unwrap(), 1);
}

#[test]
fn test_address_utxos_filters() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let receiving = client1.receiving_address(0).unwrap();
    let to_client2 = node.client(2).receiving_address(0).unwrap();

    node.mine_and_submit(&client1, 0);
    let tx = client1.create_transaction(0, &to_client2, 100).unwrap();
    node.validator.add_transaction(tx).unwrap();

    assert!(client1.address_utxos(&receiving, false, true).unwrap().is_empty());
    let all = client1.address_utxos(&receiving, false, false).unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].is_spent());

    let pending = client1.address_all_utxos(&to_client2, true).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].amount, 100);
}

#[test]
fn test_foreign_input_is_a_signing_error() {
    let node = Node::memory(params(1));
    let client1 = node.client(1);
    let client2 = node.client(2);

    node.mine_and_submit(&client1, 0);
    // Wallet 2 cannot sign for wallet 1's coinbase output
    let utxo = client1.account_utxos(0, false).unwrap().remove(0);
    let keypair = dotcoin_keypair::Keypair::from_seed(&super::seed(2)).unwrap();
    let err = keypair
        .sign_inputs(0, &[0u8; 32], &[utxo.address.clone()])
        .unwrap_err();
    assert!(matches!(err, KeyError::UnmatchedInput { .. }));
    assert_eq!(client2.balance(0).unwrap(), balance(0, 0));
}
